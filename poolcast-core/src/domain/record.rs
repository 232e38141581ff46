//! Stage records: one immutable row type per pipeline stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{Bucket, ForecasterId, QuestionId};
use super::method::MethodValues;

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("question {question}, forecaster {forecaster}: probability {value} is not finite")]
    NonFiniteProbability {
        question: QuestionId,
        forecaster: ForecasterId,
        value: f64,
    },
    #[error("question {question}, bucket {bucket}: resolved probability {value} is not finite")]
    NonFiniteResolution {
        question: QuestionId,
        bucket: Bucket,
        value: f64,
    },
}

/// A forecaster's latest submitted probability for one bucket as of one day.
///
/// At most one row exists per (question, forecaster, day, bucket). The
/// question-level metadata (`resolved_probability` per bucket and
/// `correctness_known_day`) is constant for every row of the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterDayRecord {
    pub question: QuestionId,
    pub forecaster: ForecasterId,
    pub day: NaiveDate,
    pub bucket: Bucket,
    pub probability: f64,
    pub resolved_probability: Option<f64>,
    pub correctness_known_day: Option<NaiveDate>,
}

impl ForecasterDayRecord {
    /// Build a record, rejecting non-finite probabilities.
    ///
    /// Out-of-range but finite probabilities are accepted: the estimators
    /// report them as undefined instead of coercing them.
    pub fn new(
        question: QuestionId,
        forecaster: ForecasterId,
        day: NaiveDate,
        bucket: Bucket,
        probability: f64,
        resolved_probability: Option<f64>,
        correctness_known_day: Option<NaiveDate>,
    ) -> Result<Self, RecordError> {
        if !probability.is_finite() {
            return Err(RecordError::NonFiniteProbability {
                question,
                forecaster,
                value: probability,
            });
        }
        if let Some(value) = resolved_probability.filter(|v| !v.is_finite()) {
            return Err(RecordError::NonFiniteResolution {
                question,
                bucket,
                value,
            });
        }
        Ok(Self {
            question,
            forecaster,
            day,
            bucket,
            probability,
            resolved_probability,
            correctness_known_day,
        })
    }
}

/// Carried-forward standing belief of one forecaster for one bucket on one day.
///
/// Same shape as [`ForecasterDayRecord`] but materialized for every observed
/// day of the question, not only days with a genuine submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub question: QuestionId,
    pub forecaster: ForecasterId,
    pub day: NaiveDate,
    pub bucket: Bucket,
    pub probability: f64,
    /// Present only when the engine was asked to attach it.
    pub resolved_probability: Option<f64>,
    /// Present only when the engine was asked to attach it.
    pub correctness_known_day: Option<NaiveDate>,
}

/// Pooled consensus for one (question, day, bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub question: QuestionId,
    pub day: NaiveDate,
    pub bucket: Bucket,
    /// `None` where the estimator is undefined for this group.
    pub pooled: MethodValues<Option<f64>>,
    /// Distinct forecasters contributing to the group.
    pub n_forecasters: usize,
    pub resolved_probability: Option<f64>,
}

/// Ordered Brier score per pooling method for one (question, day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayScore {
    pub question: QuestionId,
    pub day: NaiveDate,
    pub scores: MethodValues<Option<f64>>,
}

/// Ordered Brier score of one forecaster's completed distribution on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterDayScore {
    pub question: QuestionId,
    pub forecaster: ForecasterId,
    pub day: NaiveDate,
    pub correctness_known_day: Option<NaiveDate>,
    pub brier: f64,
}

/// Accuracy and participation of one forecaster on one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterRanking {
    pub question: QuestionId,
    pub forecaster: ForecasterId,
    pub avg_brier: f64,
    /// Days with an active, non-evicted estimate.
    pub n_days: usize,
    /// Calendar days the question was open.
    pub total_days: usize,
    pub participation_rate: f64,
    /// `avg_brier / participation_rate`; `None` at zero participation.
    pub adjusted_brier: Option<f64>,
}

/// Per-forecaster averages across every question they touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterSummary {
    pub forecaster: ForecasterId,
    pub avg_brier: f64,
    pub avg_adjusted_brier: Option<f64>,
    pub n_questions: usize,
    pub n_days: usize,
    pub mean_participation: f64,
}
