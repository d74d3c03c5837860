//! Turns raw backend text into a validated record or a parse failure.

use scorecard_core::{
    EvaluationOutcome, EvaluationRecord, EvaluationRequest, Evidence, FieldKind, ParseFailure,
    ParseFailureReason, EVIDENCE, JUSTIFICATION, NORMALIZED_SCORE, RAW_SCORE, RUBRIC_SUMMARY,
};
use serde_json::{Map, Value};
use tracing::debug;

/// Validates `raw` against the request's indicator. Never fails: invalid
/// text comes back as [`EvaluationOutcome::Failure`] carrying `raw` verbatim.
pub fn parse_response(raw: &str, request: &EvaluationRequest) -> EvaluationOutcome {
    match validate(raw, request) {
        Ok(record) => EvaluationOutcome::Record(record),
        Err(reason) => {
            debug!("Response for {} / {} rejected: {}", request.model, request.indicator.id, reason);
            EvaluationOutcome::Failure(ParseFailure::new(raw, reason))
        }
    }
}

/// Removes one surrounding Markdown code fence, if present.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line.
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

fn validate(raw: &str, request: &EvaluationRequest) -> Result<EvaluationRecord, ParseFailureReason> {
    let indicator = &request.indicator;
    let value: Value = serde_json::from_str(strip_fences(raw))
        .map_err(|e| ParseFailureReason::NotJson { message: e.to_string() })?;
    let top = value.as_object().ok_or(ParseFailureReason::NotAnObject)?;

    if let Some(model) = top.get("model").and_then(Value::as_str) {
        if model != request.model {
            debug!("Response names model {:?}, expected {:?}", model, request.model);
        }
    }

    let block = match top.get(&indicator.output_key) {
        Some(Value::Object(nested)) => nested,
        Some(_) => {
            return Err(ParseFailureReason::WrongType {
                field: indicator.output_key.clone(),
                expected: "an object".into(),
            })
        }
        None => top,
    };

    for field in &indicator.schema.fields {
        match block.get(&field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(ParseFailureReason::MissingField { field: field.name.clone() })
            }
            None | Some(Value::Null) => {}
            Some(value) if !kind_matches(field.kind, value) => {
                return Err(ParseFailureReason::WrongType {
                    field: field.name.clone(),
                    expected: field.kind.as_str().into(),
                })
            }
            Some(_) => {}
        }
    }

    let raw_score = number(block, RAW_SCORE);
    if !indicator.scale.contains(raw_score) {
        return Err(ParseFailureReason::ScoreNotInScale {
            score: raw_score,
            scale: indicator.scale.describe(),
        });
    }

    let expected = indicator.scale.normalize(raw_score);
    let found = number(block, NORMALIZED_SCORE);
    if found != expected {
        return Err(ParseFailureReason::NormalizedMismatch { expected, found });
    }

    let evidence = match block.get(EVIDENCE) {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| evidence(index, item, request))
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };

    Ok(EvaluationRecord {
        model: request.model.clone(),
        indicator: indicator.id.clone(),
        rubric_summary: text(block, RUBRIC_SUMMARY),
        raw_score,
        normalized_score: found,
        justification: text(block, JUSTIFICATION),
        evidence,
    })
}

fn kind_matches(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::EvidenceList => value.is_array(),
    }
}

fn number(block: &Map<String, Value>, field: &str) -> f64 {
    block.get(field).and_then(Value::as_f64).unwrap_or(f64::NAN)
}

fn text(block: &Map<String, Value>, field: &str) -> String {
    block.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn string_field<'a>(
    entry: &'a Map<String, Value>,
    key: &str,
    index: usize,
) -> Result<Option<&'a str>, ParseFailureReason> {
    match entry.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ParseFailureReason::MalformedEvidence {
            index,
            message: format!("`{key}` must be a string"),
        }),
    }
}

fn evidence(index: usize, item: &Value, request: &EvaluationRequest) -> Result<Evidence, ParseFailureReason> {
    let malformed = |message: &str| ParseFailureReason::MalformedEvidence { index, message: message.into() };
    let entry = item.as_object().ok_or_else(|| malformed("expected an object"))?;

    let doc = string_field(entry, "doc", index)?.ok_or_else(|| malformed("missing `doc`"))?;
    let quote = string_field(entry, "quote", index)?.ok_or_else(|| malformed("missing `quote`"))?;
    let location = string_field(entry, "location", index)?.unwrap_or("unknown");

    if quote.trim().is_empty() {
        return Err(ParseFailureReason::EmptyQuote { index });
    }
    let source = request
        .document(doc)
        .ok_or_else(|| ParseFailureReason::UnknownDocument { index, doc: doc.to_string() })?;

    Ok(Evidence {
        doc: source.name.clone(),
        location: location.to_string(),
        quote: quote.to_string(),
    })
}
