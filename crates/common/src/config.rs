use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiffleError};

/// Analyzer/session configuration shared across riffle crates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Hard upper bound on full passes through the rule list before the
    /// analyzer gives up on reaching a fixed point.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Database the analyzer resolves unqualified table names against.
    #[serde(default)]
    pub current_database: String,
}

fn default_max_iterations() -> usize {
    1000
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            current_database: String::new(),
        }
    }
}

impl AnalyzerConfig {
    /// Load a configuration from a JSON file.
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: AnalyzerConfig =
            serde_json::from_str(&s).map_err(|e| RiffleError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(RiffleError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
