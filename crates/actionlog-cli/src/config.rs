//! Optional JSON configuration file.
//!
//! Every section and field falls back to the built-in defaults, so a file only
//! needs to name what it changes:
//!
//! ```json
//! { "thresholds": { "high_similarity": 0.8 }, "detector": { "max_concurrent_escalations": 2 } }
//! ```

use std::path::Path;

use actionlog_ai::{ConfigError, DetectorConfig, RulesEngine, Thresholds};
use actionlog_core::Vocabulary;
use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub thresholds: Thresholds,
    pub vocabulary: Vocabulary,
    pub detector: DetectorConfig,
}

impl FileConfig {
    /// Read `path`, or use defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Build the rules engine, validating thresholds and vocabulary.
    pub fn rules(&self) -> Result<RulesEngine, ConfigError> {
        RulesEngine::new(self.thresholds.clone(), self.vocabulary.clone())
    }
}
