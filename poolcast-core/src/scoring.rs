//! Ordered Brier score for ordered categorical forecasts.
//!
//! For K ordered buckets, each split point j = 0..K-2 partitions the buckets
//! into "≤ j" and "> j". The binary Brier score at a split is
//! `(p_yes - y_yes)² + (p_no - y_no)²`, which reduces to `2·(p_yes - y_yes)²`
//! with cumulative forecast `p_yes` and cumulative truth `y_yes`. The ordered
//! score is the mean over all K-1 splits. Range [0, 2], lower is better.

use thiserror::Error;

/// Caller contract violations. These are fatal, never recoverable in-band.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("forecast and outcome are empty")]
    Empty,
    #[error("forecast has {probs} buckets but outcome has {outcome}")]
    LengthMismatch { probs: usize, outcome: usize },
    #[error("outcome must be one-hot: entry {value} at bucket {index} is not 0 or 1")]
    NotBinary { index: usize, value: f64 },
    #[error("outcome must be one-hot: found {ones} entries equal to 1")]
    NotOneHot { ones: usize },
}

/// Score one forecast distribution against a one-hot ordered outcome.
///
/// A single bucket is scored as a binary split against its implicit
/// complement. The forecast is rescaled to sum to 1 when its sum is positive;
/// the outcome is never altered.
pub fn ordered_brier(probs: &[f64], outcome: &[f64]) -> Result<f64, ScoringError> {
    if probs.len() != outcome.len() {
        return Err(ScoringError::LengthMismatch {
            probs: probs.len(),
            outcome: outcome.len(),
        });
    }
    if probs.is_empty() {
        return Err(ScoringError::Empty);
    }

    let (probs, outcome) = if probs.len() == 1 {
        (
            vec![probs[0], 1.0 - probs[0]],
            vec![outcome[0], 1.0 - outcome[0]],
        )
    } else {
        (probs.to_vec(), outcome.to_vec())
    };

    validate_one_hot(&outcome)?;

    let total: f64 = probs.iter().sum();
    let scale = if total > 0.0 { total } else { 1.0 };

    let splits = probs.len() - 1;
    let mut cum_forecast = 0.0;
    let mut cum_truth = 0.0;
    let mut acc = 0.0;
    for (p, y) in probs.iter().zip(&outcome).take(splits) {
        cum_forecast += p / scale;
        cum_truth += y;
        acc += 2.0 * (cum_forecast - cum_truth).powi(2);
    }
    Ok(acc / splits as f64)
}

fn validate_one_hot(outcome: &[f64]) -> Result<(), ScoringError> {
    if let Some((index, &value)) = outcome
        .iter()
        .enumerate()
        .find(|(_, &v)| v != 0.0 && v != 1.0)
    {
        return Err(ScoringError::NotBinary { index, value });
    }
    let ones = outcome.iter().filter(|&&v| v == 1.0).count();
    if ones != 1 {
        return Err(ScoringError::NotOneHot { ones });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_oracle_four_buckets() {
        let score = ordered_brier(&[0.0, 0.5, 0.25, 0.25], &[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert!((score - 0.625 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn single_bucket_matches_explicit_complement() {
        let one = ordered_brier(&[0.6], &[1.0]).unwrap();
        let two = ordered_brier(&[0.6, 0.4], &[1.0, 0.0]).unwrap();
        assert!((one - two).abs() < 1e-12);
        assert!((one - 0.32).abs() < 1e-12);
    }

    #[test]
    fn perfect_forecast_scores_zero() {
        assert_eq!(ordered_brier(&[0.0, 0.0, 1.0], &[0.0, 0.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn confident_wrong_extreme_scores_two() {
        let score = ordered_brier(&[1.0, 0.0, 0.0], &[0.0, 0.0, 1.0]).unwrap();
        assert!((score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn near_miss_beats_far_miss() {
        let near = ordered_brier(&[0.0, 1.0, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let far = ordered_brier(&[0.0, 0.0, 0.0, 1.0], &[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(near < far);
    }

    #[test]
    fn forecast_is_rescaled_but_zero_sum_is_left_alone() {
        let scaled = ordered_brier(&[1.0, 1.0], &[1.0, 0.0]).unwrap();
        let unit = ordered_brier(&[0.5, 0.5], &[1.0, 0.0]).unwrap();
        assert!((scaled - unit).abs() < 1e-12);

        let zero = ordered_brier(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((zero - 2.0).abs() < 1e-12);
    }

    #[test]
    fn soft_outcome_is_rejected() {
        let err = ordered_brier(&[0.5, 0.5], &[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, ScoringError::NotBinary { index: 0, .. }));
    }

    #[test]
    fn two_ones_are_rejected() {
        let err = ordered_brier(&[0.5, 0.5], &[1.0, 1.0]).unwrap_err();
        assert_eq!(err, ScoringError::NotOneHot { ones: 2 });
    }

    #[test]
    fn all_zero_outcome_is_rejected() {
        let err = ordered_brier(&[0.5, 0.5], &[0.0, 0.0]).unwrap_err();
        assert_eq!(err, ScoringError::NotOneHot { ones: 0 });
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = ordered_brier(&[0.5, 0.5], &[1.0]).unwrap_err();
        assert_eq!(err, ScoringError::LengthMismatch { probs: 2, outcome: 1 });
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(ordered_brier(&[], &[]).unwrap_err(), ScoringError::Empty);
    }
}
