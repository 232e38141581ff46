//! Analysis runner — wires together loading, cleaning, and every variant.
//!
//! Two entry points:
//! - `run_analysis()`: loads the CSV named by the config (or an override),
//!   cleans it, then runs. Used by the CLI.
//! - `run_analysis_on()`: takes already-cleaned data. Used by tests and by
//!   callers that build records themselves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AnalysisConfig, ConfigError, CorrectnessKnownPolicy};
use crate::data_loader::{clean, load_predictions, CleanedData, CleaningReport, LoadError};
use crate::pipeline::{run_variant, Notice, PipelineError, VariantResult};
use crate::rationale::{RationaleError, RationaleFilter};
use crate::summary::{comparison_table, ComparisonTable};
use crate::trimming::run_trimmed;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("rationale filter error: {0}")]
    Rationale(#[from] RationaleError),
    #[error("no input CSV given (set [input].path or pass --input)")]
    NoInput,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub input: Option<PathBuf>,
    /// BLAKE3 over the raw input bytes; empty when run on in-memory data.
    pub dataset_hash: String,
    pub config: AnalysisConfig,
    pub cleaning: CleaningReport,
    /// Variants in run order: configured variants, trimmed, rationale.
    pub variants: Vec<VariantResult>,
    pub comparison: ComparisonTable,
}

impl AnalysisResult {
    pub fn variant(&self, label: &str) -> Option<&VariantResult> {
        self.variants.iter().find(|v| v.label == label)
    }
}

/// Load and clean the input CSV, returning the cleaned data and its hash.
pub fn load_cleaned(
    path: &Path,
    policy: CorrectnessKnownPolicy,
) -> Result<(CleanedData, String), RunError> {
    let loaded = load_predictions(path)?;
    let cleaned = clean(&loaded.rows, policy)?;
    Ok((cleaned, loaded.dataset_hash))
}

/// Run the full analysis described by `config`.
pub fn run_analysis(config: &AnalysisConfig, input: Option<&Path>) -> Result<AnalysisResult, RunError> {
    config.validate()?;
    let path = input
        .map(Path::to_path_buf)
        .or_else(|| config.input.path.clone())
        .ok_or(RunError::NoInput)?;

    let (cleaned, dataset_hash) = load_cleaned(&path, config.input.correctness_known_policy)?;
    let mut result = run_analysis_on(&cleaned, config)?;
    result.input = Some(path);
    result.dataset_hash = dataset_hash;
    Ok(result)
}

/// Run every configured variant on already-cleaned data.
pub fn run_analysis_on(cleaned: &CleanedData, config: &AnalysisConfig) -> Result<AnalysisResult, RunError> {
    let records = &cleaned.records;
    let mut variants = Vec::new();

    for v in &config.variants {
        variants.push(run_variant(
            records,
            &v.label,
            v.max_staleness_days,
            &config.estimators,
        )?);
    }

    if config.trimming.enabled {
        variants.push(run_trimmed(records, &config.trimming, &config.estimators)?);
    }

    if config.rationale.enabled {
        let filter = RationaleFilter::from_config(&config.rationale)?;
        let report = filter.apply(records, &cleaned.rationales);
        let mut filtered = run_variant(
            &report.records,
            &config.rationale.label,
            config.rationale.max_staleness_days,
            &config.estimators,
        )?;
        filtered.notices.insert(
            0,
            Notice::RationaleFiltered {
                removed: report.removed,
                total: report.total,
            },
        );
        variants.push(filtered);
    }

    let comparison =
        comparison_table(variants.iter().map(|v| (v.label.as_str(), v.summary.as_slice())));

    Ok(AnalysisResult {
        input: None,
        dataset_hash: String::new(),
        config: config.clone(),
        cleaning: cleaned.report.clone(),
        variants,
        comparison,
    })
}
