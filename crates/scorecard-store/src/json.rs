//! One pretty-printed JSON file per (model, indicator).

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use scorecard_core::{EvalError, EvaluationOutcome, RunKey};
use tracing::debug;
use uuid::Uuid;

use crate::{Artifact, ArtifactRef, ResultSink};

/// Writes `<dir>/<artifact_name>.json`, atomically replacing earlier runs.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &RunKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.artifact_name()))
    }
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    });
    let result = written.and_then(|_| fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

impl ResultSink for JsonFileSink {
    fn persist(&self, key: &RunKey, outcome: &EvaluationOutcome) -> Result<ArtifactRef, EvalError> {
        let path = self.path_for(key);
        let target = path.display().to_string();

        fs::create_dir_all(&self.dir).map_err(|e| EvalError::write(&target, e))?;
        let content = serde_json::to_string_pretty(&Artifact::from_outcome(key, outcome))
            .map_err(|e| EvalError::write(&target, e))?;
        write_atomic(&path, &content).map_err(|e| EvalError::write(&target, e))?;

        debug!("Wrote {} artifact {}", outcome.status(), target);
        Ok(ArtifactRef::new(target))
    }

    fn load(&self, key: &RunKey) -> Result<Option<Artifact>, EvalError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(EvalError::Read { path, source }),
        };
        let artifact: Artifact = serde_json::from_str(&content)
            .map_err(|e| EvalError::Config(format!("corrupt artifact {}: {e}", path.display())))?;
        if artifact.key() != *key {
            return Err(EvalError::Config(format!(
                "artifact {} belongs to {}, not {}",
                path.display(),
                artifact.key(),
                key
            )));
        }
        Ok(Some(artifact))
    }
}
