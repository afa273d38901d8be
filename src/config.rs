//! Configuration loading
//!
//! Resolution order for the config file:
//! 1. `--config` command-line argument (highest priority)
//! 2. `CURATOR_CONFIG` environment variable
//! 3. `<config dir>/gallery-curator/config.toml`
//! 4. Built-in defaults (no file)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::curation::{CurationPipeline, ExplorePolicy, TierPolicy, Weights};
use crate::error::{Error, Result};
use crate::state::Library;

pub const CONFIG_ENV_VAR: &str = "CURATOR_CONFIG";

/// Settings for decoding and feature extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Longest side (pixels) images are shrunk to before analysis; 0 disables
    pub max_dimension: u32,
    /// Images decoded concurrently
    pub workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_dimension: 512,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog database location; platform data dir when unset
    pub catalog_path: Option<PathBuf>,
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
    pub analysis: AnalysisConfig,
    pub scoring: Weights,
    pub tiers: TierPolicy,
    pub explore: ExplorePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            log_level: "info".to_string(),
            analysis: AnalysisConfig::default(),
            scoring: Weights::default(),
            tiers: TierPolicy::default(),
            explore: ExplorePolicy::default(),
        }
    }
}

impl Config {
    /// Resolve and load the configuration
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: Command-line argument (must exist)
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }

        // Priority 2: Environment variable (must exist)
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        // Priority 3: user config file, if present
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // Priority 4: compiled defaults
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tiers;
        if t.medium_min >= t.strong_min {
            return Err(Error::Config(format!(
                "tiers.medium_min ({}) must be below tiers.strong_min ({})",
                t.medium_min, t.strong_min
            )));
        }
        if t.strong_cap == 0 || t.medium_cap == 0 || t.weak_cap == 0 {
            return Err(Error::Config("tier caps must be greater than zero".to_string()));
        }

        let e = &self.explore;
        if e.min_score >= e.max_score {
            return Err(Error::Config(format!(
                "explore.min_score ({}) must be below explore.max_score ({})",
                e.min_score, e.max_score
            )));
        }
        if e.cap == 0 {
            return Err(Error::Config("explore.cap must be greater than zero".to_string()));
        }

        if self.analysis.workers == 0 {
            return Err(Error::Config("analysis.workers must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Catalog location after applying the override
    pub fn catalog_path(&self) -> Result<PathBuf> {
        match &self.catalog_path {
            Some(path) => Ok(path.clone()),
            None => Library::default_path(),
        }
    }

    pub fn pipeline(&self) -> CurationPipeline {
        CurationPipeline::new(self.scoring, self.tiers, self.explore)
    }
}

/// `<config dir>/gallery-curator/config.toml` for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gallery-curator").join("config.toml"))
}
