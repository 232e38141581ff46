//! Central tendency estimators — pure functions pooling one bucket's probabilities.
//!
//! Every estimator takes the probabilities that forecasters assigned to one
//! bucket of one question-day and returns a single pooled value. `None` means
//! the estimator is undefined for the input (empty set, or an invalid
//! probability for the log-space estimators).

use serde::{Deserialize, Serialize};

use crate::domain::Method;

/// Clip bound keeping log-space estimators away from log(0) and 1/(1-1).
pub const EPS: f64 = 1e-5;

/// Default fraction trimmed from each tail by the trimmed mean.
pub const DEFAULT_TRIM_FRACTION: f64 = 0.1;

/// Estimator parameters shared by every pooling call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Fraction dropped from each tail by [`trimmed_mean`].
    pub trim_fraction: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            trim_fraction: DEFAULT_TRIM_FRACTION,
        }
    }
}

impl EstimatorConfig {
    /// Pool `probs` with the given method.
    pub fn pool(&self, method: Method, probs: &[f64]) -> Option<f64> {
        match method {
            Method::Mean => mean(probs),
            Method::Median => median(probs),
            Method::TrimmedMean => trimmed_mean(probs, self.trim_fraction),
            Method::GeometricMeanProb => geometric_mean_prob(probs),
            Method::GeometricMeanOdds => geometric_mean_odds(probs),
        }
    }

    /// Display label for `method`, naming the active trim fraction.
    pub fn label(&self, method: Method) -> String {
        match method {
            Method::TrimmedMean => {
                format!("{} ({:.0}%)", method.label(), self.trim_fraction * 100.0)
            }
            _ => method.label().to_string(),
        }
    }
}

// ─── Estimators ─────────────────────────────────────────────────────

/// Arithmetic mean.
pub fn mean(probs: &[f64]) -> Option<f64> {
    if probs.is_empty() {
        return None;
    }
    Some(probs.iter().sum::<f64>() / probs.len() as f64)
}

/// Median; the average of the two middle values for even-sized input.
pub fn median(probs: &[f64]) -> Option<f64> {
    if probs.is_empty() {
        return None;
    }
    let sorted = sorted_copy(probs);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Trimmed mean: drop ⌊n·f⌋ values from each tail, average the rest.
///
/// When trimming both tails would remove every value, the full set is
/// averaged instead.
pub fn trimmed_mean(probs: &[f64], trim_fraction: f64) -> Option<f64> {
    if probs.is_empty() {
        return None;
    }
    let sorted = sorted_copy(probs);
    let n = sorted.len();
    let k = (n as f64 * trim_fraction).floor() as usize;
    if k * 2 >= n {
        return mean(&sorted);
    }
    mean(&sorted[k..n - k])
}

/// Geometric mean of probabilities, computed in log space.
///
/// Inputs are clipped to `[EPS, 1 - EPS]`. Any negative input makes the
/// result undefined.
pub fn geometric_mean_prob(probs: &[f64]) -> Option<f64> {
    if probs.is_empty() || probs.iter().any(|&p| p < 0.0) {
        return None;
    }
    let log_mean = probs.iter().map(|&p| clip(p).ln()).sum::<f64>() / probs.len() as f64;
    Some(log_mean.exp())
}

/// Geometric mean of odds `p / (1 - p)`, converted back to a probability.
///
/// Inputs are clipped to `[EPS, 1 - EPS]`. Any input outside `[0, 1]` makes
/// the result undefined.
pub fn geometric_mean_odds(probs: &[f64]) -> Option<f64> {
    if probs.is_empty() || probs.iter().any(|&p| !(0.0..=1.0).contains(&p)) {
        return None;
    }
    let log_mean = probs
        .iter()
        .map(|&p| {
            let p = clip(p);
            (p / (1.0 - p)).ln()
        })
        .sum::<f64>()
        / probs.len() as f64;
    let odds = log_mean.exp();
    Some(odds / (1.0 + odds))
}

// ─── Helpers ────────────────────────────────────────────────────────

fn clip(p: f64) -> f64 {
    p.clamp(EPS, 1.0 - EPS)
}

fn sorted_copy(probs: &[f64]) -> Vec<f64> {
    let mut sorted = probs.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}
