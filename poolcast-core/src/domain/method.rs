//! Pooling methods and the per-method value container.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five cross-forecaster pooling estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Mean,
    Median,
    TrimmedMean,
    GeometricMeanProb,
    GeometricMeanOdds,
}

impl Method {
    /// All methods in reporting order.
    pub const ALL: [Method; 5] = [
        Method::Mean,
        Method::Median,
        Method::TrimmedMean,
        Method::GeometricMeanProb,
        Method::GeometricMeanOdds,
    ];

    /// Human-readable name for summary tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mean => "Mean",
            Self::Median => "Median",
            Self::TrimmedMean => "Trimmed mean",
            Self::GeometricMeanProb => "Geometric mean (prob)",
            Self::GeometricMeanOdds => "Geometric mean (odds)",
        }
    }

    /// Short machine key, matching the serde name.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::TrimmedMean => "trimmed_mean",
            Self::GeometricMeanProb => "geometric_mean_prob",
            Self::GeometricMeanOdds => "geometric_mean_odds",
        }
    }

    /// Column name used in exported aggregate tables.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Mean => "mean_probability",
            Self::Median => "median_probability",
            Self::TrimmedMean => "trimmed_mean_probability",
            Self::GeometricMeanProb => "geometric_mean_probability",
            Self::GeometricMeanOdds => "geometric_mean_odds",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per pooling method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodValues<T> {
    pub mean: T,
    pub median: T,
    pub trimmed_mean: T,
    pub geometric_mean_prob: T,
    pub geometric_mean_odds: T,
}

impl<T> MethodValues<T> {
    /// Build by evaluating `f` once per method.
    pub fn from_fn(mut f: impl FnMut(Method) -> T) -> Self {
        Self {
            mean: f(Method::Mean),
            median: f(Method::Median),
            trimmed_mean: f(Method::TrimmedMean),
            geometric_mean_prob: f(Method::GeometricMeanProb),
            geometric_mean_odds: f(Method::GeometricMeanOdds),
        }
    }

    pub fn get(&self, method: Method) -> &T {
        match method {
            Method::Mean => &self.mean,
            Method::Median => &self.median,
            Method::TrimmedMean => &self.trimmed_mean,
            Method::GeometricMeanProb => &self.geometric_mean_prob,
            Method::GeometricMeanOdds => &self.geometric_mean_odds,
        }
    }

    pub fn get_mut(&mut self, method: Method) -> &mut T {
        match method {
            Method::Mean => &mut self.mean,
            Method::Median => &mut self.median,
            Method::TrimmedMean => &mut self.trimmed_mean,
            Method::GeometricMeanProb => &mut self.geometric_mean_prob,
            Method::GeometricMeanOdds => &mut self.geometric_mean_odds,
        }
    }

    /// Iterate `(method, value)` pairs in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (Method, &T)> {
        Method::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}
