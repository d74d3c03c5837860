//! Indicator registry: built-in rubric definitions plus any loaded from disk.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use scorecard_core::{EvalError, Indicator};
use tracing::{debug, info};

use crate::ConfigError;

const BUILTIN: &[(&str, &str)] = &[
    ("coverage_demographics.json", include_str!("../indicators/coverage_demographics.json")),
    ("known_gaps_limitations.json", include_str!("../indicators/known_gaps_limitations.json")),
    ("safety_critical_use.json", include_str!("../indicators/safety_critical_use.json")),
    ("training_data_sources.json", include_str!("../indicators/training_data_sources.json")),
    ("third_party_licenses.json", include_str!("../indicators/third_party_licenses.json")),
];

/// Read-only map from indicator id to definition, shared across runs.
#[derive(Debug, Default, Clone)]
pub struct IndicatorRegistry {
    indicators: HashMap<String, Arc<Indicator>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The indicators shipped with scorecard.
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for (file, content) in BUILTIN {
            let indicator: Indicator = serde_json::from_str(content).map_err(|e| {
                ConfigError::Invalid(format!("built-in indicator {file}: {e}"))
            })?;
            registry.insert(indicator)?;
        }
        Ok(registry)
    }

    /// Loads every `*.json` file in `dir` as one indicator definition.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut registry = Self::new();

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let content = fs::read_to_string(&path)?;
            let indicator: Indicator = serde_json::from_str(&content)?;
            debug!("Loaded indicator {} from {}", indicator.id, path.display());
            registry.insert(indicator)?;
        }

        info!("Loaded {} indicators from {}", registry.len(), dir.display());
        Ok(registry)
    }

    /// Validates and adds an indicator, replacing any with the same id.
    pub fn insert(&mut self, indicator: Indicator) -> Result<(), ConfigError> {
        indicator.validate()?;
        self.indicators.insert(indicator.id.clone(), Arc::new(indicator));
        Ok(())
    }

    /// Adds every indicator from `other`; `other` wins on id collisions.
    pub fn merge(&mut self, other: IndicatorRegistry) {
        self.indicators.extend(other.indicators);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Indicator>> {
        self.indicators.get(id).cloned()
    }

    pub fn require(&self, id: &str) -> Result<Arc<Indicator>, EvalError> {
        self.get(id).ok_or_else(|| EvalError::UnknownIndicator(id.to_string()))
    }

    /// All indicators, sorted by id.
    pub fn list(&self) -> Vec<Arc<Indicator>> {
        let mut all: Vec<_> = self.indicators.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.indicators.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }
}
