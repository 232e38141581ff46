//! Carry-forward engine — materializes every forecaster's standing belief per day.
//!
//! For each question independently, walks the question's observed calendar
//! days in ascending order and maintains the latest submitted probability per
//! (forecaster, bucket). Each day has three phases:
//!
//! 1. **Update**: apply that day's submissions in arrival order, so the last
//!    submission of the day wins.
//! 2. **Evict**: with a staleness limit `S`, drop entries last updated more
//!    than `S` days before the current day. An entry exactly `S` days old
//!    survives.
//! 3. **Emit**: one [`Snapshot`] per surviving entry, dated the current day.
//!
//! Questions never interact, so they are processed in parallel; the output is
//! grouped by question in first-appearance order with days ascending.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{Bucket, ForecasterDayRecord, ForecasterId, QuestionId, Snapshot};
use crate::group::{group_in_order, group_sorted};

/// Which constant metadata columns to join onto emitted snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachMetadata {
    /// Per-(question, bucket) ground truth.
    pub resolved_probability: bool,
    /// Per-question correctness-known day.
    pub correctness_known_day: bool,
}

impl Default for AttachMetadata {
    fn default() -> Self {
        Self {
            resolved_probability: true,
            correctness_known_day: false,
        }
    }
}

/// Configuration for one carry-forward pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryForwardConfig {
    /// Eviction window in days. `None` carries entries forward indefinitely.
    pub max_staleness_days: Option<u32>,
    pub attach: AttachMetadata,
}

impl CarryForwardConfig {
    pub fn new(max_staleness_days: Option<u32>) -> Self {
        Self {
            max_staleness_days,
            attach: AttachMetadata::default(),
        }
    }

    pub fn with_attach(mut self, attach: AttachMetadata) -> Self {
        self.attach = attach;
        self
    }
}

/// Standing belief of one forecaster for one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Standing {
    probability: f64,
    updated: NaiveDate,
}

/// Constant per-question metadata, first observed value per key.
#[derive(Debug, Default)]
struct QuestionMetadata {
    resolved: HashMap<Bucket, Option<f64>>,
    correctness_known_day: Option<NaiveDate>,
}

impl QuestionMetadata {
    fn collect(rows: &[&ForecasterDayRecord]) -> Self {
        let mut meta = Self::default();
        for row in rows {
            meta.resolved
                .entry(row.bucket)
                .or_insert(row.resolved_probability);
            if meta.correctness_known_day.is_none() {
                meta.correctness_known_day = row.correctness_known_day;
            }
        }
        meta
    }
}

/// Working state for a single question. Owned by one engine invocation and
/// dropped before the next question starts.
#[derive(Debug)]
struct QuestionState {
    latest: BTreeMap<(ForecasterId, Bucket), Standing>,
}

impl QuestionState {
    fn new() -> Self {
        Self {
            latest: BTreeMap::new(),
        }
    }

    /// Apply one day's submissions; later rows overwrite earlier ones.
    fn apply(&mut self, day: NaiveDate, rows: &[&ForecasterDayRecord]) {
        for row in rows {
            self.latest.insert(
                (row.forecaster.clone(), row.bucket),
                Standing {
                    probability: row.probability,
                    updated: day,
                },
            );
        }
    }

    /// Drop entries older than `max_days` relative to `day`.
    fn evict(&mut self, day: NaiveDate, max_days: u32) {
        self.latest
            .retain(|_, standing| (day - standing.updated).num_days() <= i64::from(max_days));
    }

    fn emit(
        &self,
        question: &QuestionId,
        day: NaiveDate,
        meta: &QuestionMetadata,
        attach: AttachMetadata,
        out: &mut Vec<Snapshot>,
    ) {
        for ((forecaster, bucket), standing) in &self.latest {
            let resolved_probability = if attach.resolved_probability {
                meta.resolved.get(bucket).copied().flatten()
            } else {
                None
            };
            let correctness_known_day = if attach.correctness_known_day {
                meta.correctness_known_day
            } else {
                None
            };
            out.push(Snapshot {
                question: question.clone(),
                forecaster: forecaster.clone(),
                day,
                bucket: *bucket,
                probability: standing.probability,
                resolved_probability,
                correctness_known_day,
            });
        }
    }
}

/// Build carried-forward snapshots for every question in `records`.
pub fn carry_forward(records: &[ForecasterDayRecord], config: &CarryForwardConfig) -> Vec<Snapshot> {
    let questions = group_in_order(records, |r| r.question.clone());

    questions
        .par_iter()
        .map(|(question, rows)| carry_forward_question(question, rows, config))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Build carried-forward snapshots for a single question.
///
/// `rows` must all belong to `question` and be in arrival order.
pub fn carry_forward_question(
    question: &QuestionId,
    rows: &[&ForecasterDayRecord],
    config: &CarryForwardConfig,
) -> Vec<Snapshot> {
    if rows.is_empty() {
        return Vec::new();
    }

    let meta = QuestionMetadata::collect(rows);
    let by_day = group_sorted(rows, |r| r.day);
    let mut state = QuestionState::new();
    let mut out = Vec::new();

    for (day, today) in by_day {
        let today: Vec<&ForecasterDayRecord> = today.into_iter().copied().collect();
        state.apply(day, &today);
        if let Some(max_days) = config.max_staleness_days {
            state.evict(day, max_days);
        }
        state.emit(question, day, &meta, config.attach, &mut out);
    }

    out
}
