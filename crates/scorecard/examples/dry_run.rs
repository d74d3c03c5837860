//! Runs one evaluation end to end against a scripted backend.
//!
//! Run with: cargo run --example dry_run

use std::sync::Arc;

use scorecard::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("card.txt"),
        "Section 5. The model may produce inaccurate output for low-resource languages.",
    )?;

    // What a well-behaved backend would answer
    let answer = serde_json::json!({
        "model": "Demo Model",
        "indicator_L4_gaps": {
            "rubric_summary": "0 nothing, 0.5 generic caveats, 1 specific documented gaps",
            "raw_score": 0.5,
            "raw_scale": "0, 0.5, or 1",
            "normalized_score_0_1": 0.5,
            "justification": "The card names one limitation without detail.",
            "evidence": [{
                "doc": "Demo Model Card",
                "location": "Section 5",
                "quote": "The model may produce inaccurate output for low-resource languages."
            }]
        }
    });

    let backend = Arc::new(ScriptedBackend::replying(answer.to_string()));
    let registry = Arc::new(IndicatorRegistry::builtin()?);
    let sink = Arc::new(JsonFileSink::new(dir.path().join("results")));

    let evaluator = Evaluator::new(backend, registry, sink)
        .with_loader(LoaderOptions::new(dir.path(), Some(150_000)));
    let target = Target::new("demo", "Demo Model", vec![DocumentRef::new("Demo Model Card", "card.txt")]);

    let report = evaluator.run(&target, "known_gaps_limitations").await?;
    match &report.outcome {
        EvaluationOutcome::Record(record) => {
            println!("{} scored {} ({})", report.key, record.raw_score, record.justification)
        }
        EvaluationOutcome::Failure(failure) => println!("{} failed to parse: {}", report.key, failure),
    }
    println!("Artifact: {}", report.artifact);

    Ok(())
}
