//! Builds the system and user text for one evaluation.
//!
//! Everything here is a pure function of its inputs so the same indicator,
//! model and documents always produce byte-identical prompts.

use std::fmt::Write;
use std::sync::Arc;

use scorecard_core::{
    DocumentSource, EvaluationRequest, FieldKind, FieldSpec, Indicator, NORMALIZED_SCORE, RAW_SCALE,
    RAW_SCORE,
};
use serde_json::Value;
use tracing::debug;

/// Sampling settings copied onto every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptOptions {
    pub temperature: f32,
    pub stream: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self { temperature: 0.1, stream: false }
    }
}

pub fn assemble(
    indicator: Arc<Indicator>,
    model: &str,
    documents: Vec<DocumentSource>,
    options: PromptOptions,
) -> EvaluationRequest {
    let system = system_prompt(&indicator, model, &documents);
    let user = user_prompt(&indicator, model, &documents);
    debug!(
        "Assembled prompt for {} / {}: system={} chars, user={} chars",
        model,
        indicator.id,
        system.len(),
        user.len()
    );

    EvaluationRequest {
        indicator,
        model: model.to_string(),
        documents,
        system,
        user,
        temperature: options.temperature,
        stream: options.stream,
    }
}

fn quoted(s: &str) -> String {
    Value::from(s).to_string()
}

fn number(n: f64) -> String {
    n.to_string()
}

fn document_names(documents: &[DocumentSource]) -> String {
    documents.iter().map(|d| quoted(&d.name)).collect::<Vec<_>>().join(", ")
}

/// The JSON the backend must return, with placeholder values in schema order.
pub fn schema_template(indicator: &Indicator, model: &str, documents: &[DocumentSource]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{{");
    let _ = writeln!(out, "  \"model\": {},", quoted(model));
    let _ = writeln!(out, "  {}: {{", quoted(&indicator.output_key));

    let fields = &indicator.schema.fields;
    for (i, field) in fields.iter().enumerate() {
        let comma = if i + 1 < fields.len() { "," } else { "" };
        let _ = write!(out, "    {}: ", quoted(&field.name));
        out.push_str(&placeholder(indicator, field, documents));
        let _ = writeln!(out, "{comma}");
    }

    let _ = writeln!(out, "  }}");
    out.push('}');
    out
}

fn placeholder(indicator: &Indicator, field: &FieldSpec, documents: &[DocumentSource]) -> String {
    let scale = &indicator.scale;
    match (field.kind, field.name.as_str()) {
        (FieldKind::Number, RAW_SCORE) => number(scale.min()),
        (FieldKind::Number, NORMALIZED_SCORE) => number(scale.normalize(scale.min())),
        (FieldKind::Number, _) => "0".to_string(),
        (FieldKind::String, RAW_SCALE) => quoted(&scale.describe()),
        (FieldKind::String, _) => quoted(&field.description),
        (FieldKind::EvidenceList, _) => {
            let doc = documents.first().map(|d| d.name.as_str()).unwrap_or("document name");
            format!(
                "[\n      {{\n        \"doc\": {},\n        \"location\": {},\n        \"quote\": {}\n      }}\n    ]",
                quoted(doc),
                quoted("page/section if available, or 'unknown'"),
                quoted("verbatim quote from the document"),
            )
        }
    }
}

pub fn system_prompt(indicator: &Indicator, model: &str, documents: &[DocumentSource]) -> String {
    let scale = &indicator.scale;
    let scale_text = scale.describe();
    let mut out = String::new();

    out.push_str("You are an expert evaluator of AI model transparency and documentation.\n\n");
    let _ = write!(out, "You will evaluate the {model} model on one indicator");
    if !indicator.category.is_empty() {
        let _ = write!(out, " from the {} category", indicator.category);
    }
    let _ = writeln!(out, ":\n\n- {}: \"{}\"\n", indicator.code, indicator.title);

    let _ = writeln!(out, "Use the following rubric (allowed scores: {scale_text}):\n");
    let _ = writeln!(out, "{}\n", indicator.rubric.trim_end());

    out.push_str("Tasks:\n\n");
    let _ = writeln!(
        out,
        "1. Summarize, in your own words, the scoring rules for {} as \"rubric_summary\".",
        indicator.code
    );
    out.push_str("2. Read the supplied documents and extract verbatim evidence");
    if indicator.evidence_focus.is_empty() {
        out.push_str(" relevant to this indicator.\n");
    } else {
        out.push_str(" related to:\n");
        for focus in &indicator.evidence_focus {
            let _ = writeln!(out, "   - {focus}");
        }
    }
    out.push_str(
        "   For each evidence item record the exact name of the document it comes from, \
         any location you can infer (page/section, or 'unknown'), and a short verbatim quote.\n",
    );
    let _ = writeln!(out, "3. Using ONLY the supplied documents, assign raw_score as one of: {scale_text}.");
    if scale.is_unit() {
        out.push_str("   normalized_score_0_1 must be identical to raw_score.\n");
    } else {
        let _ = writeln!(
            out,
            "   normalized_score_0_1 must be (raw_score - {min}) / ({max} - {min}).",
            min = number(scale.min()),
            max = number(scale.max()),
        );
    }
    out.push_str("   Justify the score in 3-6 sentences with reference to the rubric.\n\n");

    out.push_str("Output:\n\nYou MUST output a single JSON object with the following structure:\n\n");
    out.push_str(&schema_template(indicator, model, documents));
    out.push_str("\n\nConstraints:\n");
    let _ = writeln!(out, "- Use ONLY information contained in the supplied documents: {}.", document_names(documents));
    out.push_str("- Quotes must be verbatim excerpts. Do not paraphrase or invent citations.\n");
    out.push_str("- Every evidence \"doc\" must be one of the supplied document names.\n");
    let _ = writeln!(out, "- raw_score must be one of the declared scale values: {scale_text}.");
    let _ = writeln!(
        out,
        "- If the documents contain no relevant disclosure, set raw_score to {} and say so.",
        number(scale.min())
    );
    out.push_str("- All JSON keys and values must be in English.\n");
    out.push_str("- Your entire response must be valid JSON. Do NOT include any text outside the JSON object.");
    out
}

pub fn user_prompt(indicator: &Indicator, model: &str, documents: &[DocumentSource]) -> String {
    let mut out = String::from(
        "Below are the documents you can use. They are plain-text extractions from PDFs or web pages.\n\n",
    );
    for doc in documents {
        let _ = write!(out, "[DOCUMENT: {}]\n{}\n\n", doc.name, doc.text);
    }
    let _ = write!(
        out,
        "Please now evaluate {model} on the indicator '{}: {}' and output ONLY the JSON object.",
        indicator.code, indicator.title
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorecard_core::{OutputSchema, Scale};

    pub(crate) fn indicator() -> Arc<Indicator> {
        Arc::new(Indicator {
            id: "known_gaps_limitations".into(),
            code: "L4-2".into(),
            title: "Known gaps and limitations".into(),
            category: "Data".into(),
            scale: Scale::ternary(),
            rubric: "0: nothing disclosed\n0.5: partial\n1: comprehensive".into(),
            evidence_focus: vec!["documented failure modes".into()],
            output_key: "indicator_L4_gaps".into(),
            schema: OutputSchema::standard(),
        })
    }

    fn documents() -> Vec<DocumentSource> {
        vec![
            DocumentSource::inline("GPT-4o System Card", "Section 3: limitations."),
            DocumentSource::inline("FMTI v1.1", "Indicator definitions."),
        ]
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let a = assemble(indicator(), "GPT-4o", documents(), PromptOptions::default());
        let b = assemble(indicator(), "GPT-4o", documents(), PromptOptions::default());
        assert_eq!(a.system, b.system);
        assert_eq!(a.user, b.user);
    }

    #[test]
    fn test_user_text_lists_documents_in_order() {
        let request = assemble(indicator(), "GPT-4o", documents(), PromptOptions::default());
        let first = request.user.find("[DOCUMENT: GPT-4o System Card]\nSection 3").unwrap();
        let second = request.user.find("[DOCUMENT: FMTI v1.1]\nIndicator definitions.").unwrap();
        assert!(first < second);
        assert!(request.user.ends_with("'L4-2: Known gaps and limitations' and output ONLY the JSON object."));
    }

    #[test]
    fn test_system_text_embeds_rubric_and_constraints() {
        let request = assemble(indicator(), "GPT-4o", documents(), PromptOptions::default());
        let system = &request.system;
        assert!(system.contains("- L4-2: \"Known gaps and limitations\""));
        assert!(system.contains("from the Data category"));
        assert!(system.contains("0.5: partial"));
        assert!(system.contains("   - documented failure modes"));
        assert!(system.contains("one of the declared scale values: 0, 0.5, or 1"));
        assert!(system.contains("identical to raw_score"));
        assert!(system.contains("\"GPT-4o System Card\", \"FMTI v1.1\""));
    }

    #[test]
    fn test_schema_template_is_valid_json_in_field_order() {
        let template = schema_template(&indicator(), "GPT-4o", &documents());
        let value: Value = serde_json::from_str(&template).unwrap();
        assert_eq!(value["model"], "GPT-4o");
        assert_eq!(value["indicator_L4_gaps"]["raw_scale"], "0, 0.5, or 1");
        assert_eq!(value["indicator_L4_gaps"]["evidence"][0]["doc"], "GPT-4o System Card");

        let positions: Vec<_> = OutputSchema::standard()
            .fields
            .iter()
            .map(|f| template.find(&format!("\"{}\":", f.name)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_non_unit_scale_explains_normalization() {
        let mut five = (*indicator()).clone();
        five.scale = Scale::new(vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        let system = system_prompt(&five, "GPT-4o", &documents());
        assert!(system.contains("(raw_score - 0) / (4 - 0)"));
    }

    #[test]
    fn test_options_are_copied() {
        let options = PromptOptions { temperature: 0.0, stream: true };
        let request = assemble(indicator(), "GPT-4o", documents(), options);
        assert_eq!(request.temperature, 0.0);
        assert!(request.stream);
        assert_eq!(request.model, "GPT-4o");
    }
}
