//! Day-level evaluation of pooled consensus against ground truth.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AggregateRow, Bucket, DayScore, Method, MethodValues, QuestionId};
use crate::group::group_sorted;
use crate::scoring::{ordered_brier, ScoringError};

#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("question {question}, bucket {bucket}: no resolved probability")]
    Unresolved { question: QuestionId, bucket: Bucket },
    #[error("question {question} on {day}: {source}")]
    Scoring {
        question: QuestionId,
        day: NaiveDate,
        #[source]
        source: ScoringError,
    },
}

/// Score a distribution that may contain undefined entries.
///
/// Shape and outcome are always validated; any undefined entry makes the
/// score itself undefined.
pub fn score_distribution(
    probs: &[Option<f64>],
    outcome: &[f64],
) -> Result<Option<f64>, ScoringError> {
    let filled: Vec<f64> = probs.iter().map(|p| p.unwrap_or(0.0)).collect();
    let score = ordered_brier(&filled, outcome)?;
    if probs.iter().any(Option::is_none) {
        return Ok(None);
    }
    Ok(Some(score))
}

/// Ordered Brier score per method for every (question, day) in `rows`.
///
/// Output is sorted by (question, day).
pub fn score_aggregates(rows: &[AggregateRow]) -> Result<Vec<DayScore>, EvaluationError> {
    let groups = group_sorted(rows, |r| (r.question.clone(), r.day));
    let mut out = Vec::with_capacity(groups.len());

    for ((question, day), mut buckets) in groups {
        buckets.sort_by_key(|r| r.bucket);

        let outcome = buckets
            .iter()
            .map(|r| {
                r.resolved_probability.ok_or_else(|| EvaluationError::Unresolved {
                    question: question.clone(),
                    bucket: r.bucket,
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let mut scores = MethodValues::<Option<f64>>::default();
        for method in Method::ALL {
            let probs: Vec<Option<f64>> = buckets.iter().map(|r| *r.pooled.get(method)).collect();
            *scores.get_mut(method) = score_distribution(&probs, &outcome).map_err(|source| {
                EvaluationError::Scoring {
                    question: question.clone(),
                    day,
                    source,
                }
            })?;
        }

        out.push(DayScore {
            question,
            day,
            scores,
        });
    }

    Ok(out)
}

/// Which rows a [`QuestionSummary`] averages over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryScope {
    Question(QuestionId),
    /// Every question-day in the run.
    Overall,
}

/// Mean day score per method over a question (or over everything).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub scope: SummaryScope,
    pub scores: MethodValues<Option<f64>>,
    pub n_days: usize,
}

/// Per-question averages followed by one overall row.
///
/// Undefined day scores are skipped; a method with no defined day is
/// undefined in the summary.
pub fn summarize_by_question(day_scores: &[DayScore]) -> Vec<QuestionSummary> {
    let mut out: Vec<QuestionSummary> = group_sorted(day_scores, |s| s.question.clone())
        .into_iter()
        .map(|(question, days)| QuestionSummary {
            scope: SummaryScope::Question(question),
            scores: mean_scores(&days),
            n_days: days.len(),
        })
        .collect();

    let all: Vec<&DayScore> = day_scores.iter().collect();
    out.push(QuestionSummary {
        scope: SummaryScope::Overall,
        scores: mean_scores(&all),
        n_days: all.len(),
    });
    out
}

fn mean_scores(days: &[&DayScore]) -> MethodValues<Option<f64>> {
    MethodValues::from_fn(|method| {
        let defined: Vec<f64> = days.iter().filter_map(|s| *s.scores.get(method)).collect();
        if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn row(q: &str, day: u32, bucket: Bucket, p: Option<f64>, resolved: Option<f64>) -> AggregateRow {
        AggregateRow {
            question: q.into(),
            day: d(day),
            bucket,
            pooled: MethodValues::from_fn(|_| p),
            n_forecasters: 1,
            resolved_probability: resolved,
        }
    }

    #[test]
    fn scores_every_method_per_day() {
        let rows = vec![
            row("q", 1, 1, Some(0.5), Some(1.0)),
            row("q", 1, 0, Some(0.0), Some(0.0)),
            row("q", 1, 2, Some(0.25), Some(0.0)),
            row("q", 1, 3, Some(0.25), Some(0.0)),
        ];
        let scores = score_aggregates(&rows).unwrap();
        assert_eq!(scores.len(), 1);
        for (_, s) in scores[0].scores.iter() {
            assert!((s.unwrap() - 0.625 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn undefined_pooled_value_gives_undefined_score() {
        let rows = vec![
            row("q", 1, 0, None, Some(1.0)),
            row("q", 1, 1, Some(0.5), Some(0.0)),
        ];
        let scores = score_aggregates(&rows).unwrap();
        assert_eq!(scores[0].scores.mean, None);
    }

    #[test]
    fn missing_resolution_is_fatal() {
        let rows = vec![row("q", 1, 0, Some(0.5), None)];
        let err = score_aggregates(&rows).unwrap_err();
        assert!(matches!(err, EvaluationError::Unresolved { bucket: 0, .. }));
    }

    #[test]
    fn soft_resolution_is_fatal() {
        let rows = vec![
            row("q", 1, 0, Some(0.5), Some(0.5)),
            row("q", 1, 1, Some(0.5), Some(0.5)),
        ];
        let err = score_aggregates(&rows).unwrap_err();
        assert!(matches!(err, EvaluationError::Scoring { .. }));
    }

    #[test]
    fn summary_has_question_rows_then_overall() {
        let day_scores = vec![
            DayScore {
                question: "a".into(),
                day: d(1),
                scores: MethodValues::from_fn(|_| Some(0.2)),
            },
            DayScore {
                question: "a".into(),
                day: d(2),
                scores: MethodValues::from_fn(|_| Some(0.4)),
            },
            DayScore {
                question: "b".into(),
                day: d(1),
                scores: MethodValues::from_fn(|m| (m != Method::Median).then_some(0.9)),
            },
        ];
        let summary = summarize_by_question(&day_scores);
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].scope, SummaryScope::Question("a".into()));
        assert!((summary[0].scores.mean.unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(summary[1].scores.median, None);
        assert_eq!(summary[2].scope, SummaryScope::Overall);
        assert!((summary[2].scores.mean.unwrap() - 0.5).abs() < 1e-12);
        assert!((summary[2].scores.median.unwrap() - 0.3).abs() < 1e-12);
    }
}
