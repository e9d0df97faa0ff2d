//! Configuration types and parsing for trellis.yml

use crate::error::{CoreResult, SchemaError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline configuration from trellis.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Path of the DuckDB database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Defaults applied when building populate options
    #[serde(default)]
    pub populate: PopulateDefaults,
}

/// Default knobs for population runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopulateDefaults {
    /// How many keys are drawn per sweep iteration
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Record per-key failures and continue instead of aborting the run
    #[serde(default)]
    pub suppress_errors: bool,

    /// Reserve keys before computing so cooperating workers don't collide
    #[serde(default)]
    pub reserve_jobs: bool,
}

impl Default for PopulateDefaults {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            suppress_errors: false,
            reserve_jobs: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| SchemaError::ConfigIo {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_yaml(&text)?;
        log::debug!("Loaded pipeline config '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(text: &str) -> CoreResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("trellis.duckdb")
}

fn default_batch_size() -> usize {
    128
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
