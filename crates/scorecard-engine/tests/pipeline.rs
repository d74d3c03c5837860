use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use scorecard_config::IndicatorRegistry;
use scorecard_core::{DocumentRef, EvalError, ParseFailureReason, RunKey, TRUNCATION_SENTINEL};
use scorecard_engine::{Evaluator, LoaderOptions, RetryPolicy, Stage, Target};
use scorecard_llm::ScriptedBackend;
use scorecard_store::{JsonFileSink, ResultSink, SqliteSink};
use serde_json::json;

const INDICATOR: &str = "coverage_demographics";

struct Fixture {
    dir: tempfile::TempDir,
    target: Target,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("card.txt"),
            "the model card mentions no demographic breakdown",
        )
        .unwrap();
        let target = Target::new(
            "gpt4o",
            "GPT-4o",
            vec![DocumentRef::new("GPT-4o System Card", "card.txt")],
        );
        Self { dir, target }
    }

    fn results(&self) -> std::path::PathBuf {
        self.dir.path().join("results")
    }

    fn evaluator(&self, backend: Arc<ScriptedBackend>, sink: Arc<dyn ResultSink>) -> Evaluator {
        Evaluator::new(backend, Arc::new(IndicatorRegistry::builtin().unwrap()), sink)
            .with_loader(LoaderOptions::new(self.dir.path(), Some(150_000)))
            .with_retry(fast_retry(3))
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2.0,
        jitter: false,
    }
}

fn answer(raw: f64) -> String {
    json!({
        "model": "GPT-4o",
        "indicator_L4_coverage": {
            "rubric_summary": "0 none, 0.5 partial, 1 detailed breakdown",
            "raw_score": raw,
            "raw_scale": "0, 0.5, or 1",
            "normalized_score_0_1": raw,
            "justification": "No demographic breakdown is reported.",
            "evidence": [{
                "doc": "GPT-4o System Card",
                "location": "unknown",
                "quote": "the model card mentions no demographic breakdown"
            }]
        }
    })
    .to_string()
}

fn read_artifact(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_zero_score_is_accepted_and_persisted() {
    let fx = Fixture::new();
    let backend = Arc::new(ScriptedBackend::replying(answer(0.0)));
    let sink = Arc::new(JsonFileSink::new(fx.results()));
    let evaluator = fx.evaluator(backend.clone(), sink.clone());

    let report = evaluator.run(&fx.target, INDICATOR).await.unwrap();

    let record = report.outcome.record().unwrap();
    assert_eq!(record.raw_score, 0.0);
    assert_eq!(record.normalized_score, record.raw_score);
    assert_eq!(report.attempts, 1);
    assert_eq!(backend.calls(), 1);

    let key = RunKey::new("GPT-4o", INDICATOR);
    let artifact = read_artifact(&sink.path_for(&key));
    assert_eq!(artifact["raw_score"], 0.0);
    assert_eq!(artifact["indicator"], INDICATOR);
}

#[tokio::test]
async fn test_prose_becomes_persisted_parse_failure() {
    let fx = Fixture::new();
    let prose = "After careful review I would score this a 1.";
    let backend = Arc::new(ScriptedBackend::replying(prose));
    let sink = Arc::new(JsonFileSink::new(fx.results()));
    let evaluator = fx.evaluator(backend.clone(), sink.clone());

    let report = evaluator.run(&fx.target, INDICATOR).await.unwrap();

    let failure = report.outcome.failure().unwrap();
    assert!(failure.reason.to_string().starts_with("not valid JSON"));
    assert_eq!(backend.calls(), 1, "parse failures are never retried");

    let artifact = read_artifact(&sink.path_for(&report.key));
    assert_eq!(artifact["status"], "parse_failure");
    assert_eq!(artifact["raw_response_text"], prose);
}

#[tokio::test]
async fn test_score_outside_scale_is_rejected() {
    let fx = Fixture::new();
    let backend = Arc::new(ScriptedBackend::replying(answer(0.7)));
    let evaluator = fx.evaluator(backend, Arc::new(JsonFileSink::new(fx.results())));

    let report = evaluator.run(&fx.target, INDICATOR).await.unwrap();
    let reason = &report.outcome.failure().unwrap().reason;
    assert!(matches!(reason, ParseFailureReason::ScoreNotInScale { .. }));
    assert!(reason.to_string().starts_with("score not in declared scale"));
}

#[tokio::test]
async fn test_rerun_leaves_latest_artifact() {
    let fx = Fixture::new();
    let backend = Arc::new(ScriptedBackend::new().then_text("not json").then_text(answer(0.5)));
    let sink = Arc::new(SqliteSink::in_memory().unwrap());
    let evaluator = fx.evaluator(backend, sink.clone());

    evaluator.run(&fx.target, INDICATOR).await.unwrap();
    evaluator.run(&fx.target, INDICATOR).await.unwrap();

    assert_eq!(sink.count().unwrap(), 1);
    let artifact = sink.load(&RunKey::new("GPT-4o", INDICATOR)).unwrap().unwrap();
    assert_eq!(artifact.record().unwrap().raw_score, 0.5);
}

#[tokio::test]
async fn test_missing_document_aborts_before_network() {
    let fx = Fixture::new();
    let backend = Arc::new(ScriptedBackend::replying(answer(1.0)));
    let evaluator = fx.evaluator(backend.clone(), Arc::new(JsonFileSink::new(fx.results())));
    let target = Target::new("ghost", "Ghost", vec![DocumentRef::new("Missing", "missing.txt")]);

    let err = evaluator.run(&target, INDICATOR).await.unwrap_err();
    assert_eq!(err.stage, Stage::Load);
    assert!(matches!(err.error, EvalError::NotFound { .. }));
    assert_eq!(backend.calls(), 0);
    assert!(!fx.results().exists());
}

#[tokio::test]
async fn test_unknown_indicator_aborts_before_network() {
    let fx = Fixture::new();
    let backend = Arc::new(ScriptedBackend::replying(answer(1.0)));
    let evaluator = fx.evaluator(backend.clone(), Arc::new(JsonFileSink::new(fx.results())));

    let err = evaluator.run(&fx.target, "no_such_indicator").await.unwrap_err();
    assert_eq!(err.stage, Stage::Assemble);
    assert_eq!(err.key, RunKey::new("GPT-4o", "no_such_indicator"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let fx = Fixture::new();
    let backend = Arc::new(
        ScriptedBackend::new()
            .then_error(EvalError::RateLimited { retry_after: None, message: "429".into() })
            .then_error(EvalError::Timeout(Duration::from_secs(1)))
            .then_text(answer(1.0)),
    );
    let evaluator = fx.evaluator(backend.clone(), Arc::new(JsonFileSink::new(fx.results())));

    let report = evaluator.run(&fx.target, INDICATOR).await.unwrap();
    assert!(report.outcome.is_record());
    assert_eq!(report.attempts, 3);
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_are_reported() {
    let fx = Fixture::new();
    let backend = Arc::new(
        ScriptedBackend::new()
            .then_error(EvalError::Timeout(Duration::from_secs(1)))
            .then_error(EvalError::Timeout(Duration::from_secs(1))),
    );
    let evaluator = fx
        .evaluator(backend.clone(), Arc::new(JsonFileSink::new(fx.results())))
        .with_retry(fast_retry(2));

    let err = evaluator.run(&fx.target, INDICATOR).await.unwrap_err();
    assert_eq!(err.stage, Stage::Call);
    assert!(matches!(err.error, EvalError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_transport_error_is_not_retried() {
    let fx = Fixture::new();
    let backend = Arc::new(ScriptedBackend::new().then_error(EvalError::Transport("connection refused".into())));
    let evaluator = fx.evaluator(backend.clone(), Arc::new(JsonFileSink::new(fx.results())));

    let err = evaluator.run(&fx.target, INDICATOR).await.unwrap_err();
    assert!(matches!(err.error, EvalError::Transport(_)));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_write_failure_keeps_outcome() {
    let fx = Fixture::new();
    let blocker = fx.dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let backend = Arc::new(ScriptedBackend::replying(answer(0.5)));
    let evaluator = fx.evaluator(backend, Arc::new(JsonFileSink::new(blocker.join("results"))));

    let err = evaluator.run(&fx.target, INDICATOR).await.unwrap_err();
    assert_eq!(err.stage, Stage::Persist);
    assert!(matches!(err.error, EvalError::Write { .. }));
    assert_eq!(err.unpersisted.unwrap().record().unwrap().raw_score, 0.5);
}

#[tokio::test]
async fn test_batch_runs_every_pair() {
    let fx = Fixture::new();
    fs::write(fx.dir.path().join("other.txt"), "another card").unwrap();
    let other = Target::new("claude", "Claude", vec![DocumentRef::new("Claude Card", "other.txt")]);

    let backend = Arc::new(
        ScriptedBackend::new()
            .then_text("prose")
            .then_text("prose")
            .then_text("prose")
            .then_text("prose"),
    );
    let sink = Arc::new(SqliteSink::in_memory().unwrap());
    let evaluator = fx.evaluator(backend.clone(), sink.clone());
    let indicators = vec![INDICATOR.to_string(), "known_gaps_limitations".to_string()];

    let results = evaluator.run_batch(&[fx.target.clone(), other], &indicators, 2).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_ok()));
    let mut keys: Vec<_> = results.into_iter().map(|r| r.unwrap().key).collect();
    keys.sort();
    assert_eq!(keys[0], RunKey::new("Claude", INDICATOR));
    assert_eq!(backend.calls(), 4);
    assert_eq!(sink.count().unwrap(), 4);
}

#[tokio::test]
async fn test_truncated_documents_give_identical_prompts() {
    let fx = Fixture::new();
    fs::write(fx.dir.path().join("long.txt"), "é".repeat(1_000)).unwrap();
    let target = Target::new("long", "Long", vec![DocumentRef::new("Long Card", "long.txt")]);
    let evaluator = fx
        .evaluator(Arc::new(ScriptedBackend::new()), Arc::new(JsonFileSink::new(fx.results())))
        .with_loader(LoaderOptions::new(fx.dir.path(), Some(100)));

    let first = evaluator.prepare(&target, INDICATOR).unwrap();
    let second = evaluator.prepare(&target, INDICATOR).unwrap();

    assert!(first.documents[0].truncated);
    assert!(first.user.contains(TRUNCATION_SENTINEL));
    assert_eq!(first.system, second.system);
    assert_eq!(first.user, second.user);
}

#[tokio::test]
async fn test_replay_validates_without_backend() {
    let fx = Fixture::new();
    let backend = Arc::new(ScriptedBackend::new());
    let sink = Arc::new(JsonFileSink::new(fx.results()));
    let evaluator = fx.evaluator(backend.clone(), sink.clone());

    let report = evaluator.replay(&fx.target, INDICATOR, &format!("```json\n{}\n```", answer(1.0))).unwrap();
    assert_eq!(report.outcome.record().unwrap().raw_score, 1.0);
    assert_eq!(report.attempts, 0);
    assert_eq!(backend.calls(), 0);
    assert!(sink.path_for(&report.key).exists());
}

#[tokio::test]
async fn test_targets_with_colliding_slugs_keep_separate_artifacts() {
    let fx = Fixture::new();
    let lower = Target::new("gpt4o-lower", "gpt 4o", fx.target.documents.clone());
    let backend = Arc::new(ScriptedBackend::new().then_text(answer(1.0)).then_text(answer(0.0)));
    let json = Arc::new(JsonFileSink::new(fx.results()));
    let evaluator = fx.evaluator(backend, json.clone()).with_retry(fast_retry(1));

    let first = evaluator.run(&fx.target, INDICATOR).await.unwrap();
    let second = evaluator.run(&lower, INDICATOR).await.unwrap();

    assert_ne!(first.artifact, second.artifact);
    assert_eq!(fs::read_dir(fx.results()).unwrap().count(), 2);
    let stored = json.load(&RunKey::new("GPT-4o", INDICATOR)).unwrap().unwrap();
    assert_eq!(stored.record().unwrap().model, "GPT-4o");
    assert_eq!(stored.record().unwrap().raw_score, 1.0);
}
