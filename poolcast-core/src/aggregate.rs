//! Cross-forecaster aggregation — pools snapshots into consensus distributions.
//!
//! Snapshots are grouped by (question, day, bucket) and every pooling method
//! is applied to the group's probabilities. Within each (question, day) with
//! more than one bucket, each method's column is then rescaled to sum to 1,
//! provided its sum is strictly positive.

use std::collections::BTreeSet;

use crate::domain::{AggregateRow, Method, MethodValues, Snapshot};
use crate::estimators::EstimatorConfig;
use crate::group::group_sorted;

/// Pool snapshots across forecasters and renormalize per (question, day).
///
/// Output is sorted by (question, day, bucket) and uniquely keyed by it.
pub fn aggregate_across_forecasters(
    snapshots: &[Snapshot],
    estimators: &EstimatorConfig,
) -> Vec<AggregateRow> {
    let groups = group_sorted(snapshots, |s| (s.question.clone(), s.day, s.bucket));

    let mut rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|((question, day, bucket), members)| {
            let probs: Vec<f64> = members.iter().map(|s| s.probability).collect();
            let n_forecasters = members
                .iter()
                .map(|s| &s.forecaster)
                .collect::<BTreeSet<_>>()
                .len();
            let resolved_probability = members.iter().find_map(|s| s.resolved_probability);
            AggregateRow {
                question,
                day,
                bucket,
                pooled: MethodValues::from_fn(|m| estimators.pool(m, &probs)),
                n_forecasters,
                resolved_probability,
            }
        })
        .collect();

    renormalize(&mut rows);
    rows
}

/// Rescale every method column to sum to 1 within each (question, day).
///
/// `rows` must be sorted by (question, day). Single-bucket groups and
/// columns whose defined values sum to zero or less are left untouched;
/// undefined values stay undefined.
pub fn renormalize(rows: &mut [AggregateRow]) {
    for group in rows.chunk_by_mut(|a, b| a.question == b.question && a.day == b.day) {
        if group.len() < 2 {
            continue;
        }
        for method in Method::ALL {
            let total: f64 = group.iter().filter_map(|r| *r.pooled.get(method)).sum();
            if total <= 0.0 {
                continue;
            }
            for row in group.iter_mut() {
                if let Some(v) = row.pooled.get_mut(method) {
                    *v /= total;
                }
            }
        }
    }
}

/// Count (question, day) groups whose `method` column deviates from 1 by
/// more than `tolerance`.
pub fn count_sum_deviations(rows: &[AggregateRow], method: Method, tolerance: f64) -> usize {
    rows.chunk_by(|a, b| a.question == b.question && a.day == b.day)
        .filter(|group| {
            let total: f64 = group.iter().filter_map(|r| *r.pooled.get(method)).sum();
            (total - 1.0).abs() > tolerance
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bucket, ForecasterId};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn snap(q: &str, f: &str, day: u32, bucket: Bucket, p: f64) -> Snapshot {
        Snapshot {
            question: q.into(),
            forecaster: ForecasterId::from(f),
            day: d(day),
            bucket,
            probability: p,
            resolved_probability: Some(if bucket == 1 { 1.0 } else { 0.0 }),
            correctness_known_day: None,
        }
    }

    fn column_sum(rows: &[AggregateRow], method: Method) -> f64 {
        rows.iter().filter_map(|r| *r.pooled.get(method)).sum()
    }

    #[test]
    fn empty_snapshots_give_empty_aggregate() {
        assert!(aggregate_across_forecasters(&[], &EstimatorConfig::default()).is_empty());
    }

    #[test]
    fn multi_bucket_columns_sum_to_one() {
        let snaps = vec![
            snap("q", "a", 1, 0, 0.2),
            snap("q", "a", 1, 1, 0.5),
            snap("q", "a", 1, 2, 0.3),
            snap("q", "b", 1, 0, 0.6),
            snap("q", "b", 1, 1, 0.3),
            snap("q", "b", 1, 2, 0.1),
        ];
        let rows = aggregate_across_forecasters(&snaps, &EstimatorConfig::default());
        assert_eq!(rows.len(), 3);
        for method in Method::ALL {
            assert!((column_sum(&rows, method) - 1.0).abs() < 1e-9, "{method}");
        }
        assert!(rows.iter().all(|r| r.n_forecasters == 2));
        assert_eq!(rows[1].resolved_probability, Some(1.0));
    }

    #[test]
    fn single_bucket_group_is_not_renormalized() {
        let snaps = vec![snap("q", "a", 1, 0, 0.3), snap("q", "b", 1, 0, 0.5)];
        let rows = aggregate_across_forecasters(&snaps, &EstimatorConfig::default());
        assert_eq!(rows.len(), 1);
        assert!((rows[0].pooled.mean.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn zero_sum_column_is_left_alone() {
        let mut rows = aggregate_across_forecasters(
            &[snap("q", "a", 1, 0, 0.0), snap("q", "a", 1, 1, 0.0)],
            &EstimatorConfig::default(),
        );
        assert_eq!(rows[0].pooled.mean, Some(0.0));
        renormalize(&mut rows);
        assert_eq!(rows[1].pooled.mean, Some(0.0));
    }

    #[test]
    fn undefined_values_stay_undefined() {
        let snaps = vec![snap("q", "a", 1, 0, -0.2), snap("q", "a", 1, 1, 0.4)];
        let rows = aggregate_across_forecasters(&snaps, &EstimatorConfig::default());
        assert_eq!(rows[0].pooled.geometric_mean_prob, None);
        assert!((rows[1].pooled.geometric_mean_prob.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn renormalize_twice_is_a_no_op() {
        let snaps = vec![
            snap("q", "a", 1, 0, 0.1),
            snap("q", "a", 1, 1, 0.7),
            snap("q", "b", 1, 0, 0.4),
            snap("q", "b", 1, 1, 0.4),
        ];
        let rows = aggregate_across_forecasters(&snaps, &EstimatorConfig::default());
        let mut again = rows.clone();
        renormalize(&mut again);
        for (a, b) in rows.iter().zip(&again) {
            for method in Method::ALL {
                let (x, y) = (a.pooled.get(method).unwrap(), b.pooled.get(method).unwrap());
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn groups_split_by_question_and_day() {
        let snaps = vec![
            snap("q", "a", 2, 0, 0.5),
            snap("q", "a", 2, 1, 0.5),
            snap("q", "a", 1, 0, 0.2),
            snap("q", "a", 1, 1, 0.2),
        ];
        let rows = aggregate_across_forecasters(&snaps, &EstimatorConfig::default());
        assert_eq!(rows[0].day, d(1));
        assert!((rows[0].pooled.mean.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(count_sum_deviations(&rows, Method::Mean, 1e-6), 0);
    }

    #[test]
    fn deviation_counter_flags_single_bucket_groups() {
        let snaps = vec![snap("q", "a", 1, 0, 0.3)];
        let rows = aggregate_across_forecasters(&snaps, &EstimatorConfig::default());
        assert_eq!(count_sum_deviations(&rows, Method::Mean, 3e-2), 1);
    }
}
