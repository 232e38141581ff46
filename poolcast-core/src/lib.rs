//! Poolcast Core — forecast records, carry-forward engine, pooling, ordered scoring.
//!
//! This crate contains the algorithmic heart of the consensus evaluation:
//! - Domain records, one immutable type per pipeline stage
//! - Five central tendency estimators for pooling one bucket's probabilities
//! - Carry-forward engine materializing each forecaster's standing belief per day
//! - Cross-forecaster aggregation with per-day renormalization
//! - Ordered Brier scoring rule for ordered categorical outcomes
//! - Individual scoring with participation-rate adjustment

pub mod aggregate;
pub mod carry_forward;
pub mod domain;
pub mod estimators;
pub mod evaluate;
pub mod group;
pub mod individual;
pub mod scoring;

pub use aggregate::{aggregate_across_forecasters, count_sum_deviations, renormalize};
pub use carry_forward::{carry_forward, carry_forward_question, AttachMetadata, CarryForwardConfig};
pub use estimators::EstimatorConfig;
pub use evaluate::{
    score_aggregates, summarize_by_question, EvaluationError, QuestionSummary, SummaryScope,
};
pub use individual::{
    question_calendars, score_individuals, summarize_per_forecaster, IndividualScores,
    QuestionCalendar,
};
pub use scoring::{ordered_brier, ScoringError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: records and configs are Send + Sync, so questions
    /// can be processed on any rayon worker.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::ForecasterDayRecord>();
        require_sync::<domain::ForecasterDayRecord>();
        require_send::<domain::Snapshot>();
        require_sync::<domain::Snapshot>();
        require_send::<domain::AggregateRow>();
        require_sync::<domain::AggregateRow>();
        require_send::<domain::DayScore>();
        require_sync::<domain::DayScore>();
        require_send::<domain::ForecasterRanking>();
        require_sync::<domain::ForecasterRanking>();

        require_send::<CarryForwardConfig>();
        require_sync::<CarryForwardConfig>();
        require_send::<EstimatorConfig>();
        require_sync::<EstimatorConfig>();
        require_send::<IndividualScores>();
        require_sync::<IndividualScores>();
    }

    /// Estimators share one signature, so any method can be applied to any group.
    #[test]
    fn every_method_pools_through_one_entry_point() {
        let cfg = EstimatorConfig::default();
        for method in domain::Method::ALL {
            let pooled = cfg.pool(method, &[0.5, 0.5]);
            assert!((pooled.unwrap() - 0.5).abs() < 1e-9, "{method}");
        }
    }
}
