//! Variant pipeline — snapshots → aggregates → day scores → summaries.
//!
//! A variant is one complete pass of the core chain under a fixed staleness
//! window. The untrimmed variants enter through [`run_variant`]; the trimmed
//! variant builds and filters its own snapshots, then shares
//! [`run_from_snapshots`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use poolcast_core::domain::{AggregateRow, DayScore, ForecasterDayRecord, Method, Snapshot};
use poolcast_core::{
    aggregate_across_forecasters, carry_forward, count_sum_deviations, score_aggregates,
    summarize_by_question, CarryForwardConfig, EstimatorConfig, EvaluationError, QuestionSummary,
};

use crate::summary::{summary_table, SummaryRow};
use crate::trimming::{TrimError, TrimOutcome};

/// Tolerance on a question-day's pooled mean column summing to 1.
pub const SUM_TOLERANCE: f64 = 3e-2;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("trimming failed: {0}")]
    Trim(#[from] TrimError),
}

/// Non-fatal anomaly surfaced alongside an otherwise complete result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Question-day groups whose pooled mean column is off 1 by more than `tolerance`.
    SumDrift { groups: usize, tolerance: f64 },
    /// Trimming found nobody eligible; nobody was excluded.
    NoEligibleForecasters,
    /// Post-freeze snapshot rows removed for excluded forecasters.
    SnapshotsDropped { rows: usize, forecasters: usize },
    /// Forecasters removed by the rationale keyword filter.
    RationaleFiltered { removed: usize, total: usize },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SumDrift { groups, tolerance } => write!(
                f,
                "{groups} question-day groups do not sum to 1 (tol={tolerance})"
            ),
            Notice::NoEligibleForecasters => {
                write!(f, "no eligible forecasters to trim; trimming skipped")
            }
            Notice::SnapshotsDropped { rows, forecasters } => write!(
                f,
                "dropped {rows} post-freeze snapshot rows for {forecasters} excluded forecasters"
            ),
            Notice::RationaleFiltered { removed, total } => {
                write!(f, "rationale filter removed {removed} of {total} forecasters")
            }
        }
    }
}

/// Everything one variant produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    pub label: String,
    pub max_staleness_days: Option<u32>,
    pub snapshots: Vec<Snapshot>,
    pub aggregates: Vec<AggregateRow>,
    pub day_scores: Vec<DayScore>,
    /// Per-question rows followed by the overall row.
    pub question_summary: Vec<QuestionSummary>,
    pub summary: Vec<SummaryRow>,
    pub notices: Vec<Notice>,
    /// Present only for the freeze/rank/trim variant.
    pub trim: Option<TrimOutcome>,
}

/// Carried-forward snapshots with ground truth attached.
pub fn build_snapshots(
    records: &[ForecasterDayRecord],
    max_staleness_days: Option<u32>,
) -> Vec<Snapshot> {
    carry_forward(records, &CarryForwardConfig::new(max_staleness_days))
}

/// Run one untrimmed variant end to end.
pub fn run_variant(
    records: &[ForecasterDayRecord],
    label: &str,
    max_staleness_days: Option<u32>,
    estimators: &EstimatorConfig,
) -> Result<VariantResult, PipelineError> {
    tracing::info!(label, ?max_staleness_days, records = records.len(), "running variant");
    let snapshots = build_snapshots(records, max_staleness_days);
    run_from_snapshots(label, max_staleness_days, snapshots, estimators)
}

/// Shared tail of every variant: aggregate, sanity-check, score, summarize.
pub fn run_from_snapshots(
    label: &str,
    max_staleness_days: Option<u32>,
    snapshots: Vec<Snapshot>,
    estimators: &EstimatorConfig,
) -> Result<VariantResult, PipelineError> {
    let aggregates = aggregate_across_forecasters(&snapshots, estimators);

    let mut notices = Vec::new();
    let drift = count_sum_deviations(&aggregates, Method::Mean, SUM_TOLERANCE);
    if drift > 0 {
        tracing::warn!(
            label,
            groups = drift,
            tolerance = SUM_TOLERANCE,
            "question-day groups do not sum to 1"
        );
        notices.push(Notice::SumDrift {
            groups: drift,
            tolerance: SUM_TOLERANCE,
        });
    }

    let day_scores = score_aggregates(&aggregates)?;
    let question_summary = summarize_by_question(&day_scores);
    let summary = summary_table(&day_scores);

    tracing::debug!(
        label,
        snapshots = snapshots.len(),
        aggregates = aggregates.len(),
        question_days = day_scores.len(),
        "variant complete"
    );

    Ok(VariantResult {
        label: label.to_string(),
        max_staleness_days,
        snapshots,
        aggregates,
        day_scores,
        question_summary,
        summary,
        notices,
        trim: None,
    })
}
