//! Serializable analysis configuration, loaded from TOML.
//!
//! Every section is optional; a missing section takes its documented default.
//! A config with no `[[variants]]` runs the two standard variants
//! (`nostale` and `stale7`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use poolcast_core::EstimatorConfig;

use crate::rationale::RationaleConfig;
use crate::trimming::TrimConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How to pick a question's canonical correctness-known day when its rows
/// carry more than one distinct timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectnessKnownPolicy {
    #[default]
    Earliest,
    Latest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Raw prediction CSV. May be overridden on the command line.
    pub path: Option<PathBuf>,
    pub correctness_known_policy: CorrectnessKnownPolicy,
}

/// One untrimmed pipeline variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub label: String,
    /// Omitted = unlimited carry-forward.
    #[serde(default)]
    pub max_staleness_days: Option<u32>,
}

impl VariantConfig {
    pub fn new(label: impl Into<String>, max_staleness_days: Option<u32>) -> Self {
        Self {
            label: label.into(),
            max_staleness_days,
        }
    }
}

fn default_variants() -> Vec<VariantConfig> {
    vec![
        VariantConfig::new("nostale", None),
        VariantConfig::new("stale7", Some(7)),
    ]
}

/// Complete configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub estimators: EstimatorConfig,
    /// Freeze/rank/trim variant. Absent section = defaults; set
    /// `enabled = false` to skip it.
    #[serde(default)]
    pub trimming: TrimConfig,
    #[serde(default)]
    pub rationale: RationaleConfig,
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            estimators: EstimatorConfig::default(),
            trimming: TrimConfig::default(),
            rationale: RationaleConfig::default(),
            variants: default_variants(),
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("estimators.trim_fraction", self.estimators.trim_fraction)?;
        check_fraction(
            "trimming.resolved_fraction_at_freeze",
            self.trimming.resolved_fraction_at_freeze,
        )?;
        check_fraction("trimming.bottom_frac_to_trim", self.trimming.bottom_frac_to_trim)?;
        check_fraction(
            "trimming.min_participation_rate",
            self.trimming.min_participation_rate,
        )?;

        if self.rationale.enabled && self.rationale.keywords.is_empty() {
            return Err(ConfigError::Invalid(
                "rationale filter is enabled but has no keywords".into(),
            ));
        }

        let mut seen = HashSet::new();
        for label in self.labels() {
            if label.trim().is_empty() {
                return Err(ConfigError::Invalid("variant label must not be empty".into()));
            }
            if !seen.insert(label) {
                return Err(ConfigError::Invalid(format!("duplicate variant label '{label}'")));
            }
        }
        Ok(())
    }

    /// Labels of every variant this config will run, in run order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.variants.iter().map(|v| v.label.as_str()).collect();
        if self.trimming.enabled {
            labels.push(&self.trimming.label);
        }
        if self.rationale.enabled {
            labels.push(&self.rationale.label);
        }
        labels
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {value}")))
    }
}
