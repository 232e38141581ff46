//! Poolcast Runner — ingestion, variant orchestration, trimming, summaries, export.
//!
//! This crate builds on `poolcast-core` to provide:
//! - CSV ingestion and cleaning into forecaster-day records
//! - Data-quality checks over raw prediction files
//! - Staleness variants run through the full pool-and-score pipeline
//! - Freeze-rank-trim controller removing the worst forecasters
//! - Rationale keyword filter
//! - Summary and cross-variant comparison tables
//! - JSON/CSV/Markdown artifact export

pub mod checks;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod pipeline;
pub mod rationale;
pub mod runner;
pub mod summary;
pub mod trimming;

pub use checks::{run_checks, run_checks_file, CheckReport};
pub use config::{AnalysisConfig, ConfigError, CorrectnessKnownPolicy, InputConfig, VariantConfig};
pub use data_loader::{
    clean, load_predictions, read_predictions, CleanedData, CleaningReport, LoadError,
    LoadedPredictions, RawPrediction,
};
pub use export::{save_artifacts, RunManifest};
pub use pipeline::{run_variant, Notice, PipelineError, VariantResult};
pub use rationale::{RationaleConfig, RationaleEntry, RationaleError, RationaleFilter};
pub use runner::{load_cleaned, run_analysis, run_analysis_on, AnalysisResult, RunError};
pub use summary::{comparison_table, summary_table, ComparisonTable, SummaryRow};
pub use trimming::{run_trimmed, TrimConfig, TrimError, TrimOutcome};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<AnalysisConfig>();
        assert_sync::<AnalysisConfig>();
        assert_send::<TrimConfig>();
        assert_sync::<TrimConfig>();
        assert_send::<RationaleConfig>();
        assert_sync::<RationaleConfig>();
    }

    #[test]
    fn cleaned_data_is_send_sync() {
        assert_send::<CleanedData>();
        assert_sync::<CleanedData>();
    }

    #[test]
    fn variant_result_is_send_sync() {
        assert_send::<VariantResult>();
        assert_sync::<VariantResult>();
    }

    #[test]
    fn analysis_result_is_send_sync() {
        assert_send::<AnalysisResult>();
        assert_sync::<AnalysisResult>();
    }

    #[test]
    fn rationale_filter_is_send_sync() {
        assert_send::<RationaleFilter>();
        assert_sync::<RationaleFilter>();
    }

    #[test]
    fn check_report_is_send_sync() {
        assert_send::<CheckReport>();
        assert_sync::<CheckReport>();
    }
}
