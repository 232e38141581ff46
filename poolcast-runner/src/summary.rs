//! Compact per-method summary and cross-variant comparison tables.

use serde::{Deserialize, Serialize};

use poolcast_core::domain::{DayScore, Method};

/// One estimator's performance across every question-day of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub method: Method,
    /// Mean Ordered Brier over defined question-day scores.
    pub mean: Option<f64>,
    /// Sample standard deviation (n − 1). Undefined below two samples.
    pub std_dev: Option<f64>,
    /// Number of question-days with a defined score.
    pub n: usize,
}

/// Per-method mean, sample std and count, best (lowest mean) first.
///
/// Methods with no defined score sort last, in [`Method::ALL`] order.
pub fn summary_table(day_scores: &[DayScore]) -> Vec<SummaryRow> {
    let mut rows: Vec<SummaryRow> = Method::ALL
        .into_iter()
        .map(|method| {
            let values: Vec<f64> = day_scores
                .iter()
                .filter_map(|s| *s.scores.get(method))
                .collect();
            let (mean, std_dev) = mean_and_sample_std(&values);
            SummaryRow {
                method,
                mean,
                std_dev,
                n: values.len(),
            }
        })
        .collect();

    rows.sort_by(|a, b| match (a.mean, b.mean) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.method.cmp(&b.method),
    });
    rows
}

fn mean_and_sample_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), None);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some(var.sqrt()))
}

// ─── Comparison ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub method: Method,
    /// Mean score per variant, aligned with [`ComparisonTable::labels`].
    pub means: Vec<Option<f64>>,
}

/// Mean score of every method under every variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub labels: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

/// Side-by-side table: one row per method, one column per variant.
///
/// Row order follows the first variant's ranking.
pub fn comparison_table<'a, I>(variants: I) -> ComparisonTable
where
    I: IntoIterator<Item = (&'a str, &'a [SummaryRow])>,
{
    let variants: Vec<(&str, &[SummaryRow])> = variants.into_iter().collect();
    let order: Vec<Method> = variants
        .first()
        .map(|(_, rows)| rows.iter().map(|r| r.method).collect())
        .unwrap_or_else(|| Method::ALL.to_vec());

    let rows = order
        .into_iter()
        .map(|method| ComparisonRow {
            method,
            means: variants
                .iter()
                .map(|(_, rows)| rows.iter().find(|r| r.method == method).and_then(|r| r.mean))
                .collect(),
        })
        .collect();

    ComparisonTable {
        labels: variants.iter().map(|(label, _)| label.to_string()).collect(),
        rows,
    }
}
