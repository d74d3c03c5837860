//! Evaluation configuration and the indicator registry.
//!
//! [`EvalConfig`] is read from a JSON file and overlaid with environment
//! variables. [`IndicatorRegistry`] holds the rubric definitions runs are
//! scored against.

mod registry;

pub use registry::IndicatorRegistry;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use scorecard_core::{slug, DocumentRef, EvalError};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Credential not set: environment variable {0} is empty or missing")]
    MissingCredential(String),

    #[error("Target not found: {0}")]
    UnknownTarget(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Indicator(#[from] EvalError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential
// ─────────────────────────────────────────────────────────────────────────────

/// Backend credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(***)")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Any `/chat/completions` server: DeepSeek, OpenAI, vLLM, Ollama.
    #[default]
    OpenaiCompatible,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub provider: Provider,
    /// Base URL; the client appends the provider's request path.
    /// Defaults to the provider's public endpoint.
    pub endpoint: Option<String>,
    /// Backend model name (e.g. "deepseek-reasoner").
    pub model: String,
    /// Name of the environment variable holding the credential.
    pub api_key_env: String,
    pub temperature: f32,
    pub stream: bool,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Provider {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::OpenaiCompatible => "https://api.deepseek.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }
}

impl BackendConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(self.provider.default_endpoint())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenaiCompatible,
            endpoint: None,
            model: "deepseek-reasoner".to_string(),
            api_key_env: "SCORECARD_API_KEY".to_string(),
            temperature: 0.1,
            stream: false,
            timeout_secs: 300,
            max_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Directory relative document paths resolve against.
    pub root: PathBuf,
    /// Per-document character limit.
    pub max_chars: Option<usize>,
    /// Documents appended to every target (e.g. the rubric source text).
    pub shared: Vec<DocumentRef>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("."), max_chars: Some(150_000), shared: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first (1 = no retries).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one JSON artifact per run.
    pub dir: PathBuf,
    /// Optional SQLite database for aggregation.
    pub sqlite: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("results"), sqlite: None }
    }
}

/// A model under evaluation and the documents describing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    /// Display name used in prompts and records (e.g. "GPT-4o").
    pub name: String,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

// ─────────────────────────────────────────────────────────────────────────────
// EvalConfig
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Extra indicator definitions, one JSON file each.
    #[serde(default)]
    pub indicators_dir: Option<PathBuf>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl EvalConfig {
    /// Reads a config file, resolves relative paths against its directory,
    /// applies `SCORECARD_*` environment overrides, and validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config: EvalConfig = serde_json::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EvalConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.documents.root);
        join(&mut self.output.dir);
        if let Some(db) = self.output.sqlite.as_mut() {
            join(db);
        }
        if let Some(dir) = self.indicators_dir.as_mut() {
            join(dir);
        }
    }

    /// Overlays values from `lookup` (normally the process environment).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("SCORECARD_ENDPOINT") {
            self.backend.endpoint = Some(v);
        }
        if let Some(v) = lookup("SCORECARD_MODEL") {
            self.backend.model = v;
        }
        if let Some(v) = lookup("SCORECARD_TEMPERATURE") {
            self.backend.temperature = v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SCORECARD_TEMPERATURE is not a number: {v}")))?;
        }
        if let Some(v) = lookup("SCORECARD_MAX_CHARS") {
            let n = v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SCORECARD_MAX_CHARS is not an integer: {v}")))?;
            self.documents.max_chars = Some(n);
        }
        if let Some(v) = lookup("SCORECARD_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within 0..=2, got {}",
                self.backend.temperature
            )));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.documents.max_chars == Some(0) {
            return Err(ConfigError::Invalid("max_chars must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid("retry.multiplier must be at least 1.0".into()));
        }

        // Runs are keyed by target name, so names must stay distinct once slugged.
        let mut ids = std::collections::HashSet::new();
        let mut slugs = std::collections::HashMap::new();
        for target in &self.targets {
            if !ids.insert(target.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate target id: {}", target.id)));
            }
            if let Some(other) = slugs.insert(slug(&target.name), target.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "target names {:?} and {:?} collide once slugged",
                    other, target.name
                )));
            }
        }
        Ok(())
    }

    /// Reads the credential from the variable named by `backend.api_key_env`.
    pub fn credential(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<Credential, ConfigError> {
        let var = &self.backend.api_key_env;
        match lookup(var).filter(|v| !v.trim().is_empty()) {
            Some(secret) => Ok(Credential::new(secret)),
            None => Err(ConfigError::MissingCredential(var.clone())),
        }
    }

    pub fn target(&self, id: &str) -> Result<&TargetConfig, ConfigError> {
        self.targets
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ConfigError::UnknownTarget(id.to_string()))
    }

    /// The target's own documents followed by the shared documents.
    pub fn documents_for(&self, target: &TargetConfig) -> Vec<DocumentRef> {
        target
            .documents
            .iter()
            .chain(self.documents.shared.iter())
            .cloned()
            .collect()
    }

    /// Built-in indicators plus any found in `indicators_dir`.
    pub fn registry(&self) -> Result<IndicatorRegistry, ConfigError> {
        let mut registry = IndicatorRegistry::builtin()?;
        if let Some(dir) = &self.indicators_dir {
            registry.merge(IndicatorRegistry::load_from_dir(dir)?);
        }
        Ok(registry)
    }
}
