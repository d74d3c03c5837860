//! SQLite-backed result storage.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use scorecard_core::{EvalError, EvaluationOutcome, RunKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{Artifact, ArtifactRef, ResultSink};

/// Errors from result store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-model rollup of stored evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: String,
    pub indicators: u32,
    pub scored: u32,
    pub parse_failures: u32,
    /// Mean normalized score over scored indicators.
    pub mean_normalized_score: Option<f64>,
}

/// One row per (model, indicator); re-runs replace the row.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS evaluations (
                model TEXT NOT NULL,
                indicator TEXT NOT NULL,
                status TEXT NOT NULL,
                raw_score REAL,
                normalized_score REAL,
                artifact TEXT NOT NULL,
                run_id TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (model, indicator)
            );

            CREATE INDEX IF NOT EXISTS idx_evaluations_status ON evaluations(status);
            "#,
        )?;

        Ok(())
    }

    fn upsert(&self, key: &RunKey, artifact: &Artifact) -> Result<String, StoreError> {
        let json = serde_json::to_string(artifact)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let (raw, normalized) = match artifact.record() {
            Some(r) => (Some(r.raw_score), Some(r.normalized_score)),
            None => (None, None),
        };
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute(
            r#"INSERT INTO evaluations
               (model, indicator, status, raw_score, normalized_score, artifact, run_id, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
               ON CONFLICT(model, indicator) DO UPDATE SET
               status = excluded.status, raw_score = excluded.raw_score,
               normalized_score = excluded.normalized_score, artifact = excluded.artifact,
               run_id = excluded.run_id, updated_at = excluded.updated_at"#,
            params![
                key.model,
                key.indicator,
                artifact.status(),
                raw,
                normalized,
                json,
                run_id,
                now_ms(),
            ],
        )?;

        Ok(run_id)
    }

    /// Fetches the stored artifact for a key.
    pub fn get(&self, key: &RunKey) -> Result<Option<Artifact>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let json: Option<String> = conn
            .query_row(
                "SELECT artifact FROM evaluations WHERE model = ?1 AND indicator = ?2",
                params![key.model, key.indicator],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    /// Number of stored evaluations.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Per-model rollup, sorted by model.
    pub fn summary(&self) -> Result<Vec<ModelSummary>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let mut stmt = conn.prepare(
            r#"SELECT model, COUNT(*),
                      SUM(CASE WHEN status = 'scored' THEN 1 ELSE 0 END),
                      SUM(CASE WHEN status = 'parse_failure' THEN 1 ELSE 0 END),
                      AVG(normalized_score)
               FROM evaluations GROUP BY model ORDER BY model"#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ModelSummary {
                    model: row.get(0)?,
                    indicators: row.get(1)?,
                    scored: row.get(2)?,
                    parse_failures: row.get(3)?,
                    mean_normalized_score: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl ResultSink for SqliteSink {
    fn persist(&self, key: &RunKey, outcome: &EvaluationOutcome) -> Result<ArtifactRef, EvalError> {
        let artifact = Artifact::from_outcome(key, outcome);
        let run_id = self.upsert(key, &artifact).map_err(|e| EvalError::write("sqlite", e))?;
        debug!("Stored {} row for {} (run {})", outcome.status(), key, run_id);
        Ok(ArtifactRef::new(format!("sqlite:{}", key.artifact_name())))
    }

    fn load(&self, key: &RunKey) -> Result<Option<Artifact>, EvalError> {
        self.get(key).map_err(|e| EvalError::Config(format!("sqlite: {e}")))
    }
}
