//! Configuration - analysis defaults layered from user and project files
//!
//! Layers, lowest priority first:
//! 1. built-in defaults
//! 2. user config (`$ABCALC_CONFIG`, or `config.yaml` in the platform config dir)
//! 3. project config (`abcalc.yaml` in the project directory)
//!
//! CLI flags override the merged result.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::calc::contribution::{LimitType, TotalMode};
use crate::calc::montecarlo::IncludeFlags;
use crate::core::error::CalcError;

pub const PROJECT_CONFIG_FILE: &str = "abcalc.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContributionDefaults {
    pub cutoff: f64,
    pub limit_type: LimitType,
    pub total_mode: TotalMode,
    pub relative: bool,
}

impl Default for ContributionDefaults {
    fn default() -> Self {
        Self {
            cutoff: 0.05,
            limit_type: LimitType::Percent,
            total_mode: TotalMode::Score,
            relative: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloDefaults {
    pub iterations: usize,
    pub seed: Option<u64>,
    pub include: IncludeFlags,
}

impl Default for MonteCarloDefaults {
    fn default() -> Self {
        Self {
            iterations: 10,
            seed: None,
            include: IncludeFlags::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GsaDefaults {
    pub cutoff_technosphere: f64,
    pub cutoff_biosphere: f64,
}

impl Default for GsaDefaults {
    fn default() -> Self {
        Self {
            cutoff_technosphere: 0.01,
            cutoff_biosphere: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Decimal places for exported numbers; shortest round-trip when unset
    pub float_precision: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub contribution: ContributionDefaults,
    pub monte_carlo: MonteCarloDefaults,
    pub gsa: GsaDefaults,
    pub export: ExportDefaults,
}

impl Config {
    /// Load and merge all configuration layers
    pub fn load(project_dir: Option<&Path>) -> Result<Self, CalcError> {
        let mut merged = serde_yml::Value::Mapping(Default::default());

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                merge_values(&mut merged, read_value(&path)?);
            }
        }

        if let Some(dir) = project_dir {
            let path = dir.join(PROJECT_CONFIG_FILE);
            if path.exists() {
                merge_values(&mut merged, read_value(&path)?);
            }
        }

        let config: Config = serde_yml::from_value(merged)
            .map_err(|e| CalcError::Store(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a single YAML document on top of the defaults
    pub fn from_yaml(content: &str) -> Result<Self, CalcError> {
        let config: Config = serde_yml::from_str(content)
            .map_err(|e| CalcError::Store(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ABCALC_CONFIG") {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from("org", "abcalc", "abcalc").map(|d| d.config_dir().join("config.yaml"))
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        self.contribution
            .limit_type
            .validate(self.contribution.cutoff)?;
        for (name, value) in [
            ("gsa.cutoff_technosphere", self.gsa.cutoff_technosphere),
            ("gsa.cutoff_biosphere", self.gsa.cutoff_biosphere),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(CalcError::invalid(name, "must lie in [0, 1)"));
            }
        }
        Ok(())
    }
}

fn read_value(path: &Path) -> Result<serde_yml::Value, CalcError> {
    let content = std::fs::read_to_string(path)?;
    serde_yml::from_str(&content)
        .map_err(|e| CalcError::Store(format!("{}: {}", path.display(), e)))
}

/// Recursively overlay `overlay` onto `base`; mappings merge, everything else replaces
fn merge_values(base: &mut serde_yml::Value, overlay: serde_yml::Value) {
    match (base, overlay) {
        (serde_yml::Value::Mapping(base_map), serde_yml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (_, serde_yml::Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.contribution.cutoff, 0.05);
        assert_eq!(config.contribution.limit_type, LimitType::Percent);
        assert_eq!(config.monte_carlo.iterations, 10);
        assert_eq!(config.gsa.cutoff_technosphere, 0.01);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("contribution:\n  cutoff: 3\n  limit_type: number\n").unwrap();
        assert_eq!(config.contribution.cutoff, 3.0);
        assert_eq!(config.contribution.limit_type, LimitType::Number);
        assert!(config.contribution.relative);
        assert_eq!(config.gsa.cutoff_biosphere, 0.01);
    }

    #[test]
    fn test_invalid_percent_cutoff_rejected() {
        assert!(Config::from_yaml("contribution:\n  cutoff: 1.5\n").is_err());
    }

    #[test]
    fn test_project_layer_merges() {
        let tmp = tempdir().unwrap();
        std::fs::write(
            tmp.path().join(PROJECT_CONFIG_FILE),
            "monte_carlo:\n  iterations: 250\n  seed: 7\n",
        )
        .unwrap();
        let config = Config::load(Some(tmp.path())).unwrap();
        assert_eq!(config.monte_carlo.iterations, 250);
        assert_eq!(config.monte_carlo.seed, Some(7));
    }

    #[test]
    fn test_merge_values_overlay() {
        let mut base: serde_yml::Value = serde_yml::from_str("a:\n  b: 1\n  c: 2\n").unwrap();
        let overlay: serde_yml::Value = serde_yml::from_str("a:\n  c: 3\n").unwrap();
        merge_values(&mut base, overlay);
        assert_eq!(base["a"]["b"], serde_yml::Value::from(1));
        assert_eq!(base["a"]["c"], serde_yml::Value::from(3));
    }
}
