//! Freeze/rank/trim controller — excludes the worst forecasters after a freeze day.
//!
//! Three strictly sequential phases:
//! 1. **Freeze**: sort questions by correctness-known day and freeze at the
//!    day by which the target fraction has resolved.
//! 2. **Rank**: score individuals on the questions resolved by the freeze
//!    day, filter to eligible forecasters and pick the worst fraction.
//! 3. **Trim**: rebuild full-period snapshots, drop the excluded forecasters'
//!    rows dated after the freeze day, and re-run the shared pipeline.
//!
//! Excluded forecasters keep every pre-freeze contribution.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use poolcast_core::domain::{ForecasterDayRecord, ForecasterId, ForecasterRanking, QuestionId, Snapshot};
use poolcast_core::group::group_sorted;
use poolcast_core::{score_individuals, EstimatorConfig};

use crate::pipeline::{build_snapshots, run_from_snapshots, Notice, PipelineError, VariantResult};

// ─── Configuration ───────────────────────────────────────────────────

/// Parameters of the trimmed variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub enabled: bool,
    pub label: String,
    /// Staleness window for both the training scores and the final pass.
    pub max_staleness_days: Option<u32>,
    /// Target fraction of resolved questions at the freeze day (default 0.40).
    pub resolved_fraction_at_freeze: f64,
    /// Fraction of eligible forecasters to exclude (default 0.10, at least one).
    pub bottom_frac_to_trim: f64,
    /// Minimum active days on a question for that question to count.
    pub min_days_eligibility: usize,
    pub min_participation_rate: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            label: "stale7_trimmed".to_string(),
            max_staleness_days: Some(7),
            resolved_fraction_at_freeze: 0.40,
            bottom_frac_to_trim: 0.10,
            min_days_eligibility: 10,
            min_participation_rate: 0.10,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TrimError {
    #[error("no resolved questions available to determine a freeze day")]
    NoResolvedQuestions,
    #[error("no questions resolved by freeze day {freeze_day}; cannot rank forecasters")]
    NoTrainingQuestions { freeze_day: NaiveDate },
}

// ─── Result types ────────────────────────────────────────────────────

/// Where the competition was frozen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreezePoint {
    pub day: NaiveDate,
    /// Share of resolved questions whose correctness-known day is on or
    /// before `day`.
    pub resolved_fraction: f64,
    pub n_resolved: usize,
}

/// One eligible forecaster's training score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedForecaster {
    pub forecaster: ForecasterId,
    /// Mean coverage-adjusted Brier over eligible questions. Higher is worse.
    pub score: f64,
    pub n_questions: usize,
}

/// Diagnostics of a trimmed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimOutcome {
    pub freeze: FreezePoint,
    pub n_training_questions: usize,
    /// Eligible forecasters, worst first.
    pub ranked: Vec<RankedForecaster>,
    pub excluded: BTreeSet<ForecasterId>,
    pub dropped_snapshot_rows: usize,
}

// ─── Phase 1: freeze ─────────────────────────────────────────────────

/// Pick the freeze day: index ⌈f·N⌉ − 1 (clamped to 0) of the ascending
/// correctness-known days of the N resolved questions.
pub fn select_freeze_day(
    records: &[ForecasterDayRecord],
    resolved_fraction: f64,
) -> Result<FreezePoint, TrimError> {
    let resolved: BTreeSet<(NaiveDate, QuestionId)> = records
        .iter()
        .filter_map(|r| r.correctness_known_day.map(|ck| (ck, r.question.clone())))
        .collect();
    let days: Vec<NaiveDate> = resolved.into_iter().map(|(ck, _)| ck).collect();
    if days.is_empty() {
        return Err(TrimError::NoResolvedQuestions);
    }

    let n = days.len();
    let index = ((resolved_fraction * n as f64).ceil() as usize)
        .saturating_sub(1)
        .min(n - 1);
    let day = days[index];
    let covered = days.iter().filter(|&&ck| ck <= day).count();

    Ok(FreezePoint {
        day,
        resolved_fraction: covered as f64 / n as f64,
        n_resolved: n,
    })
}

/// Rows of questions resolved on or before `freeze_day`.
pub fn training_slice(records: &[ForecasterDayRecord], freeze_day: NaiveDate) -> Vec<ForecasterDayRecord> {
    records
        .iter()
        .filter(|r| r.correctness_known_day.is_some_and(|ck| ck <= freeze_day))
        .cloned()
        .collect()
}

// ─── Phase 2: rank ───────────────────────────────────────────────────

/// Average eligible adjusted scores per forecaster, worst first.
///
/// A (question, forecaster) row is eligible with at least
/// `min_days_eligibility` active days, a participation rate of at least
/// `min_participation_rate`, and a defined adjusted score. Ties break on
/// forecaster id.
pub fn rank_forecasters(per_question: &[ForecasterRanking], config: &TrimConfig) -> Vec<RankedForecaster> {
    let eligible: Vec<&ForecasterRanking> = per_question
        .iter()
        .filter(|r| {
            r.n_days >= config.min_days_eligibility
                && r.participation_rate >= config.min_participation_rate
                && r.adjusted_brier.is_some()
        })
        .collect();

    let mut ranked: Vec<RankedForecaster> = group_sorted(&eligible, |r| r.forecaster.clone())
        .into_iter()
        .map(|(forecaster, rows)| {
            let scores: Vec<f64> = rows.iter().filter_map(|r| r.adjusted_brier).collect();
            RankedForecaster {
                forecaster,
                score: scores.iter().sum::<f64>() / scores.len() as f64,
                n_questions: scores.len(),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.forecaster.cmp(&b.forecaster))
    });
    ranked
}

/// The worst `fraction` of `ranked`, at least one when anyone is ranked.
pub fn select_worst(ranked: &[RankedForecaster], fraction: f64) -> BTreeSet<ForecasterId> {
    if ranked.is_empty() {
        return BTreeSet::new();
    }
    let n_trim = ((fraction * ranked.len() as f64).floor() as usize).max(1);
    ranked
        .iter()
        .take(n_trim)
        .map(|r| r.forecaster.clone())
        .collect()
}

// ─── Phase 3: trim ───────────────────────────────────────────────────

/// Remove rows dated after `freeze_day` that belong to an excluded forecaster.
///
/// Returns the kept snapshots and how many rows were dropped.
pub fn drop_post_freeze(
    snapshots: Vec<Snapshot>,
    freeze_day: NaiveDate,
    excluded: &BTreeSet<ForecasterId>,
) -> (Vec<Snapshot>, usize) {
    let before = snapshots.len();
    let kept: Vec<Snapshot> = snapshots
        .into_iter()
        .filter(|s| !(s.day > freeze_day && excluded.contains(&s.forecaster)))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Run the full freeze/rank/trim variant.
pub fn run_trimmed(
    records: &[ForecasterDayRecord],
    config: &TrimConfig,
    estimators: &EstimatorConfig,
) -> Result<VariantResult, PipelineError> {
    let freeze = select_freeze_day(records, config.resolved_fraction_at_freeze)?;
    tracing::info!(
        freeze_day = %freeze.day,
        resolved_fraction = freeze.resolved_fraction,
        "freeze day selected"
    );

    let train = training_slice(records, freeze.day);
    if train.is_empty() {
        return Err(TrimError::NoTrainingQuestions {
            freeze_day: freeze.day,
        }
        .into());
    }
    let n_training_questions = train.iter().map(|r| &r.question).collect::<BTreeSet<_>>().len();

    let individuals = score_individuals(&train, config.max_staleness_days)?;
    let ranked = rank_forecasters(&individuals.per_question, config);

    let mut notices = Vec::new();
    let excluded = select_worst(&ranked, config.bottom_frac_to_trim);
    if excluded.is_empty() {
        tracing::warn!("no eligible forecasters to trim; skipping trimming");
        notices.push(Notice::NoEligibleForecasters);
    } else {
        tracing::info!(
            excluded = excluded.len(),
            eligible = ranked.len(),
            "excluding worst forecasters after freeze day"
        );
    }

    let snapshots = build_snapshots(records, config.max_staleness_days);
    let (snapshots, dropped_snapshot_rows) = drop_post_freeze(snapshots, freeze.day, &excluded);
    if !excluded.is_empty() {
        tracing::info!(rows = dropped_snapshot_rows, "dropped post-freeze snapshot rows");
        notices.push(Notice::SnapshotsDropped {
            rows: dropped_snapshot_rows,
            forecasters: excluded.len(),
        });
    }

    let mut result = run_from_snapshots(
        &config.label,
        config.max_staleness_days,
        snapshots,
        estimators,
    )?;
    notices.append(&mut result.notices);
    result.notices = notices;
    result.trim = Some(TrimOutcome {
        freeze,
        n_training_questions,
        ranked,
        excluded,
        dropped_snapshot_rows,
    });
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolcast_core::domain::Bucket;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn rec(q: &str, f: &str, day: u32, bucket: Bucket, ck: Option<u32>) -> ForecasterDayRecord {
        ForecasterDayRecord {
            question: q.into(),
            forecaster: f.into(),
            day: d(day),
            bucket,
            probability: 0.5,
            resolved_probability: Some(if bucket == 0 { 1.0 } else { 0.0 }),
            correctness_known_day: ck.map(d),
        }
    }

    fn ranking(f: &str, n_days: usize, pr: f64, adjusted: Option<f64>) -> ForecasterRanking {
        ForecasterRanking {
            question: "q".into(),
            forecaster: f.into(),
            avg_brier: 0.5,
            n_days,
            total_days: 20,
            participation_rate: pr,
            adjusted_brier: adjusted,
        }
    }

    #[test]
    fn freeze_day_is_fourth_of_ten_at_forty_percent() {
        let records: Vec<_> = (1..=10)
            .map(|i| rec(&format!("q{i}"), "a", 1, 0, Some(i * 2)))
            .collect();
        let freeze = select_freeze_day(&records, 0.4).unwrap();
        assert_eq!(freeze.day, d(8));
        assert_eq!(freeze.n_resolved, 10);
        assert!((freeze.resolved_fraction - 0.4).abs() < 1e-12);
    }

    #[test]
    fn zero_fraction_freezes_at_first_resolution() {
        let records = vec![rec("q1", "a", 1, 0, Some(5)), rec("q2", "a", 1, 0, Some(3))];
        assert_eq!(select_freeze_day(&records, 0.0).unwrap().day, d(3));
        assert_eq!(select_freeze_day(&records, 1.0).unwrap().day, d(5));
    }

    #[test]
    fn questions_count_once_regardless_of_row_count() {
        let records = vec![
            rec("q1", "a", 1, 0, Some(2)),
            rec("q1", "b", 1, 0, Some(2)),
            rec("q1", "c", 1, 1, Some(2)),
            rec("q2", "a", 1, 0, Some(9)),
        ];
        let freeze = select_freeze_day(&records, 0.5).unwrap();
        assert_eq!(freeze.n_resolved, 2);
        assert_eq!(freeze.day, d(2));
    }

    #[test]
    fn no_resolved_questions_is_fatal() {
        let records = vec![rec("q", "a", 1, 0, None)];
        assert_eq!(
            select_freeze_day(&records, 0.4).unwrap_err(),
            TrimError::NoResolvedQuestions
        );
    }

    #[test]
    fn training_slice_keeps_questions_resolved_by_freeze() {
        let records = vec![
            rec("q1", "a", 1, 0, Some(4)),
            rec("q2", "a", 1, 0, Some(5)),
            rec("q3", "a", 1, 0, None),
        ];
        let train = training_slice(&records, d(4));
        assert_eq!(train.len(), 1);
        assert_eq!(train[0].question.as_str(), "q1");
    }

    #[test]
    fn ineligible_rows_are_filtered_before_ranking() {
        let config = TrimConfig::default();
        let rows = vec![
            ranking("few_days", 3, 0.9, Some(9.0)),
            ranking("rare", 12, 0.05, Some(9.0)),
            ranking("undefined", 12, 0.5, None),
            ranking("ok", 12, 0.5, Some(1.0)),
        ];
        let ranked = rank_forecasters(&rows, &config);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].forecaster.as_str(), "ok");
    }

    #[test]
    fn ranking_averages_per_forecaster_worst_first() {
        let config = TrimConfig::default();
        let mut rows = vec![
            ranking("a", 10, 0.5, Some(1.0)),
            ranking("a", 10, 0.5, Some(3.0)),
            ranking("b", 10, 0.5, Some(2.5)),
            ranking("c", 10, 0.5, Some(0.4)),
        ];
        rows[1].question = "q2".into();
        let ranked = rank_forecasters(&rows, &config);
        let order: Vec<&str> = ranked.iter().map(|r| r.forecaster.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(ranked[1].n_questions, 2);
        assert!((ranked[1].score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn at_least_one_forecaster_is_trimmed() {
        let ranked: Vec<RankedForecaster> = ["x", "y", "z"]
            .iter()
            .map(|f| RankedForecaster {
                forecaster: (*f).into(),
                score: 1.0,
                n_questions: 1,
            })
            .collect();
        let worst = select_worst(&ranked, 0.1);
        assert_eq!(worst.len(), 1);
        assert!(worst.contains(&ForecasterId::from("x")));
        assert!(select_worst(&[], 0.1).is_empty());
    }

    #[test]
    fn only_post_freeze_rows_of_excluded_forecasters_are_dropped() {
        let snaps: Vec<Snapshot> = [("g", 3), ("g", 5), ("g", 6), ("h", 6)]
            .iter()
            .map(|&(f, day)| Snapshot {
                question: "q".into(),
                forecaster: f.into(),
                day: d(day),
                bucket: 0,
                probability: 0.5,
                resolved_probability: Some(1.0),
                correctness_known_day: None,
            })
            .collect();
        let excluded: BTreeSet<ForecasterId> = [ForecasterId::from("g")].into();
        let (kept, dropped) = drop_post_freeze(snaps, d(5), &excluded);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 3);
        assert!(kept
            .iter()
            .all(|s| !(s.forecaster.as_str() == "g" && s.day > d(5))));
    }

    #[test]
    fn no_eligible_forecasters_degenerates_to_untrimmed() {
        let records = vec![
            rec("q1", "a", 1, 0, Some(2)),
            rec("q1", "a", 1, 1, Some(2)),
            rec("q2", "a", 3, 0, Some(9)),
            rec("q2", "a", 3, 1, Some(9)),
        ];
        let result = run_trimmed(&records, &TrimConfig::default(), &EstimatorConfig::default()).unwrap();
        let trim = result.trim.unwrap();
        assert!(trim.excluded.is_empty());
        assert_eq!(trim.dropped_snapshot_rows, 0);
        assert!(result.notices.contains(&Notice::NoEligibleForecasters));
        assert_eq!(result.label, "stale7_trimmed");
    }
}
