//! Data-quality checks over a raw prediction CSV.
//!
//! Works on untyped string records so that a malformed file can still be
//! inspected. Missing required columns are fatal; every other finding is a
//! count for a human to review.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data_loader::{parse_timestamp, LoadError};

/// Columns the checks need.
pub const CHECK_COLUMNS: [&str; 8] = [
    "prediction set id",
    "discover question id",
    "answer id",
    "forecasted probability",
    "filled at",
    "answer resolved probability",
    "membership guid",
    "answer sort order",
];

/// Tolerance on a multi-answer prediction set summing to 1.
pub const SET_SUM_TOLERANCE: f64 = 1e-3;

/// Largest number of answers a prediction set may carry.
pub const MAX_BUCKETS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullCount {
    pub column: String,
    pub nulls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSum {
    pub prediction_set: String,
    pub sum: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub rows: usize,
    pub missing_columns: Vec<String>,
    pub null_counts: Vec<NullCount>,
    pub unresolved_questions: Vec<String>,
    pub probability_out_of_range: usize,
    pub non_numeric_probabilities: usize,
    /// Rows sharing (prediction set, answer, filled at) with another row.
    pub duplicate_event_rows: usize,
    pub prediction_sets: usize,
    /// Sets whose sort orders are not exactly {0..n-1} with 1 ≤ n ≤ 5.
    pub sort_order_anomalies: Vec<String>,
    pub sets_off_one: Vec<SetSum>,
    /// `None` when the file lacks `created at` or `updated at`.
    pub created_after_updated: Option<usize>,
}

impl CheckReport {
    pub fn is_fatal(&self) -> bool {
        !self.missing_columns.is_empty()
    }
}

fn is_null(value: &str) -> bool {
    matches!(
        value.trim(),
        "" | "NA" | "N/A" | "NaN" | "nan" | "null" | "NULL" | "None"
    )
}

/// Run every check against a CSV file.
pub fn run_checks_file(path: &Path) -> Result<CheckReport, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    run_checks(file)
}

/// Run every check against any CSV source.
pub fn run_checks<R: Read>(reader: R) -> Result<CheckReport, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

    let missing_columns: Vec<String> = CHECK_COLUMNS
        .iter()
        .filter(|c| !index.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    if !missing_columns.is_empty() {
        tracing::error!(missing = ?missing_columns, "missing required columns");
        return Ok(CheckReport {
            missing_columns,
            ..CheckReport::default()
        });
    }

    let records = rdr.records().collect::<Result<Vec<csv::StringRecord>, _>>()?;
    let col = |record: &csv::StringRecord, name: &str| -> String {
        index
            .get(name)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
            .to_string()
    };

    let mut report = CheckReport {
        rows: records.len(),
        ..CheckReport::default()
    };

    // Nulls in required fields
    report.null_counts = CHECK_COLUMNS
        .iter()
        .map(|c| NullCount {
            column: c.to_string(),
            nulls: records.iter().filter(|r| is_null(&col(r, c))).count(),
        })
        .collect();

    let mut unresolved = BTreeSet::new();
    for r in &records {
        if is_null(&col(r, "answer resolved probability")) {
            let q = col(r, "discover question id");
            if !is_null(&q) {
                unresolved.insert(q);
            }
        }
    }
    report.unresolved_questions = unresolved.into_iter().collect();

    // Probability range
    for r in &records {
        let raw = col(r, "forecasted probability");
        if is_null(&raw) {
            continue;
        }
        match raw.trim().parse::<f64>() {
            Ok(p) if !(0.0..=1.0).contains(&p) => report.probability_out_of_range += 1,
            Ok(_) => {}
            Err(_) => report.non_numeric_probabilities += 1,
        }
    }

    // Duplicate events
    let mut events: HashMap<(String, String, String), usize> = HashMap::new();
    for r in &records {
        let key = (
            col(r, "prediction set id"),
            col(r, "answer id"),
            col(r, "filled at"),
        );
        *events.entry(key).or_default() += 1;
    }
    report.duplicate_event_rows = events.values().filter(|&&n| n > 1).sum();

    // Per prediction set: sort orders and sums
    let mut sets: BTreeMap<String, Vec<&csv::StringRecord>> = BTreeMap::new();
    for r in &records {
        sets.entry(col(r, "prediction set id")).or_default().push(r);
    }
    report.prediction_sets = sets.len();

    for (set, rows) in &sets {
        if !sort_orders_ok(rows.iter().map(|r| col(r, "answer sort order"))) {
            report.sort_order_anomalies.push(set.clone());
        }

        let answers: BTreeSet<String> = rows.iter().map(|r| col(r, "answer id")).collect();
        if answers.len() < 2 {
            continue;
        }
        let probs: Vec<f64> = rows
            .iter()
            .filter_map(|r| col(r, "forecasted probability").trim().parse::<f64>().ok())
            .filter(|p| !p.is_nan())
            .collect();
        if probs.is_empty() {
            continue;
        }
        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > SET_SUM_TOLERANCE {
            report.sets_off_one.push(SetSum {
                prediction_set: set.clone(),
                sum,
            });
        }
    }

    // created at <= updated at
    if index.contains_key("created at") && index.contains_key("updated at") {
        let bad = records
            .iter()
            .filter(|r| {
                match (
                    parse_timestamp(&col(r, "created at")),
                    parse_timestamp(&col(r, "updated at")),
                ) {
                    (Some(c), Some(u)) => c > u,
                    _ => false,
                }
            })
            .count();
        report.created_after_updated = Some(bad);
    }

    Ok(report)
}

fn sort_orders_ok(values: impl Iterator<Item = String>) -> bool {
    let mut seen = BTreeSet::new();
    for v in values {
        if is_null(&v) {
            return false;
        }
        match v.trim().parse::<f64>() {
            Ok(x) if x >= 0.0 && x.fract() == 0.0 => {
                seen.insert(x as usize);
            }
            _ => return false,
        }
    }
    let n = seen.len();
    (1..=MAX_BUCKETS).contains(&n) && seen.into_iter().eq(0..n)
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fatal() {
            return writeln!(
                f,
                "FATAL: missing required columns: {}",
                self.missing_columns.join(", ")
            );
        }
        writeln!(f, "Rows: {}", self.rows)?;
        writeln!(f, "\n[Nulls in required fields]")?;
        for n in &self.null_counts {
            writeln!(f, "- {}: {}", n.column, n.nulls)?;
        }
        writeln!(f, "\n[Questions with unresolved answers]")?;
        writeln!(f, "- {}", self.unresolved_questions.join(", "))?;
        writeln!(f, "\n[Probability outside 0..1]")?;
        writeln!(f, "- rows: {}", self.probability_out_of_range)?;
        if self.non_numeric_probabilities > 0 {
            writeln!(f, "- non-numeric: {}", self.non_numeric_probabilities)?;
        }
        writeln!(f, "\n[Duplicate (prediction set id, answer id, filled at)]")?;
        writeln!(f, "- rows: {}", self.duplicate_event_rows)?;
        writeln!(f, "\n[Answer sort order per prediction set]")?;
        writeln!(
            f,
            "OK: {}/{}  anomalies: {}",
            self.prediction_sets - self.sort_order_anomalies.len(),
            self.prediction_sets,
            self.sort_order_anomalies.len()
        )?;
        writeln!(f, "\n[Sum-to-one by prediction set (multi-answer sets)]")?;
        writeln!(f, "- sets off 1.0: {}", self.sets_off_one.len())?;
        for s in self.sets_off_one.iter().take(5) {
            writeln!(f, "  {}: {:.6}", s.prediction_set, s.sum)?;
        }
        if let Some(n) = self.created_after_updated {
            writeln!(f, "\n[created at <= updated at]")?;
            writeln!(f, "- rows: {n}")?;
        }
        Ok(())
    }
}
