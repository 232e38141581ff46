//! Individual scoring — per-forecaster Ordered Brier with participation adjustment.
//!
//! Pipeline per question:
//! 1. Carry every forecaster's submissions forward over the question's
//!    observed calendar (same engine and staleness policy as the aggregate).
//! 2. Drop snapshot days after the question's correctness-known day.
//! 3. Complete each (forecaster, day) bucket vector: buckets without a
//!    standing estimate get probability 0.
//! 4. Score each completed day, then average per (question, forecaster).
//!
//! Participation rate = active days / calendar days the question was open.
//! The adjusted score divides the average Brier by the participation rate, so
//! rare participants cannot rank well on a few lucky days.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::carry_forward::{carry_forward, AttachMetadata, CarryForwardConfig};
use crate::domain::{
    Bucket, ForecasterDayRecord, ForecasterDayScore, ForecasterRanking, ForecasterSummary,
    QuestionId, Snapshot,
};
use crate::evaluate::EvaluationError;
use crate::group::group_sorted;
use crate::scoring::ordered_brier;

/// Open period of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCalendar {
    /// Earliest observed submission day.
    pub start: NaiveDate,
    pub correctness_known_day: Option<NaiveDate>,
    /// Inclusive day count from `start` to the correctness-known day, or to
    /// the last observed day when that is unknown. Never below 1.
    pub total_days: usize,
}

/// Build the open-period calendar of every question in `records`.
pub fn question_calendars(records: &[ForecasterDayRecord]) -> BTreeMap<QuestionId, QuestionCalendar> {
    group_sorted(records, |r| r.question.clone())
        .into_iter()
        .filter_map(|(question, rows)| {
            let start = rows.iter().map(|r| r.day).min()?;
            let last_seen = rows.iter().map(|r| r.day).max()?;
            let correctness_known_day = rows.iter().filter_map(|r| r.correctness_known_day).max();
            let end = correctness_known_day.unwrap_or(last_seen);
            let span = (end - start).num_days() + 1;
            let total_days = usize::try_from(span).unwrap_or(0).max(1);
            Some((
                question,
                QuestionCalendar {
                    start,
                    correctness_known_day,
                    total_days,
                },
            ))
        })
        .collect()
}

/// All three levels of individual scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualScores {
    /// One row per (question, forecaster, day).
    pub daily: Vec<ForecasterDayScore>,
    /// One row per (question, forecaster).
    pub per_question: Vec<ForecasterRanking>,
    /// One row per forecaster.
    pub per_forecaster: Vec<ForecasterSummary>,
}

/// Score every forecaster on every question in `records`.
pub fn score_individuals(
    records: &[ForecasterDayRecord],
    max_staleness_days: Option<u32>,
) -> Result<IndividualScores, EvaluationError> {
    let config = CarryForwardConfig::new(max_staleness_days).with_attach(AttachMetadata {
        resolved_probability: true,
        correctness_known_day: true,
    });
    let snapshots: Vec<Snapshot> = carry_forward(records, &config)
        .into_iter()
        .filter(|s| s.correctness_known_day.map_or(true, |ck| s.day <= ck))
        .collect();

    let catalog = answer_catalog(records);
    let calendars = question_calendars(records);

    let daily = score_days(&snapshots, &catalog)?;
    let per_question = rank_per_question(&daily, &calendars);
    let per_forecaster = summarize_per_forecaster(&per_question);

    Ok(IndividualScores {
        daily,
        per_question,
        per_forecaster,
    })
}

/// Bucket ordinals and ground truth per question, first observed value per bucket.
fn answer_catalog(records: &[ForecasterDayRecord]) -> BTreeMap<QuestionId, BTreeMap<Bucket, Option<f64>>> {
    let mut catalog: BTreeMap<QuestionId, BTreeMap<Bucket, Option<f64>>> = BTreeMap::new();
    for r in records {
        catalog
            .entry(r.question.clone())
            .or_default()
            .entry(r.bucket)
            .or_insert(r.resolved_probability);
    }
    catalog
}

fn score_days(
    snapshots: &[Snapshot],
    catalog: &BTreeMap<QuestionId, BTreeMap<Bucket, Option<f64>>>,
) -> Result<Vec<ForecasterDayScore>, EvaluationError> {
    let groups = group_sorted(snapshots, |s| (s.question.clone(), s.forecaster.clone(), s.day));
    let mut out = Vec::with_capacity(groups.len());

    for ((question, forecaster, day), rows) in groups {
        let Some(answers) = catalog.get(&question) else {
            continue;
        };
        let held: BTreeMap<Bucket, f64> = rows.iter().map(|s| (s.bucket, s.probability)).collect();

        let mut probs = Vec::with_capacity(answers.len());
        let mut outcome = Vec::with_capacity(answers.len());
        for (&bucket, &resolved) in answers {
            let resolved = resolved.ok_or_else(|| EvaluationError::Unresolved {
                question: question.clone(),
                bucket,
            })?;
            probs.push(held.get(&bucket).copied().unwrap_or(0.0));
            outcome.push(resolved);
        }

        let brier = ordered_brier(&probs, &outcome).map_err(|source| EvaluationError::Scoring {
            question: question.clone(),
            day,
            source,
        })?;

        out.push(ForecasterDayScore {
            correctness_known_day: rows.first().and_then(|s| s.correctness_known_day),
            question,
            forecaster,
            day,
            brier,
        });
    }

    Ok(out)
}

fn rank_per_question(
    daily: &[ForecasterDayScore],
    calendars: &BTreeMap<QuestionId, QuestionCalendar>,
) -> Vec<ForecasterRanking> {
    group_sorted(daily, |s| (s.question.clone(), s.forecaster.clone()))
        .into_iter()
        .map(|((question, forecaster), days)| {
            let n_days = days.len();
            let avg_brier = days.iter().map(|s| s.brier).sum::<f64>() / n_days as f64;
            let total_days = calendars.get(&question).map_or(1, |c| c.total_days);
            let participation_rate = (n_days as f64 / total_days as f64).clamp(0.0, 1.0);
            let adjusted_brier = (participation_rate > 0.0).then(|| avg_brier / participation_rate);
            ForecasterRanking {
                question,
                forecaster,
                avg_brier,
                n_days,
                total_days,
                participation_rate,
                adjusted_brier,
            }
        })
        .collect()
}

/// Unweighted averages across every question each forecaster touched.
pub fn summarize_per_forecaster(per_question: &[ForecasterRanking]) -> Vec<ForecasterSummary> {
    group_sorted(per_question, |r| r.forecaster.clone())
        .into_iter()
        .map(|(forecaster, rows)| {
            let n = rows.len() as f64;
            let adjusted: Vec<f64> = rows.iter().filter_map(|r| r.adjusted_brier).collect();
            ForecasterSummary {
                forecaster,
                avg_brier: rows.iter().map(|r| r.avg_brier).sum::<f64>() / n,
                avg_adjusted_brier: (!adjusted.is_empty())
                    .then(|| adjusted.iter().sum::<f64>() / adjusted.len() as f64),
                n_questions: rows.len(),
                n_days: rows.iter().map(|r| r.n_days).sum(),
                mean_participation: rows.iter().map(|r| r.participation_rate).sum::<f64>() / n,
            }
        })
        .collect()
}
