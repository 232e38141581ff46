//! Prediction loading and cleaning for the runner.
//!
//! Reads raw prediction rows from CSV and turns them into
//! [`ForecasterDayRecord`]s:
//! 1. Drop every row of a question that has any row without a resolved
//!    probability (the question cannot be scored)
//! 2. Drop rows flagged as made after correctness was known
//! 3. Date each row by the UTC calendar day of its `created at`
//! 4. Keep only each forecaster's latest prediction set per question-day,
//!    ordered by (`created at`, `prediction set id`)
//! 5. Attach the per-question correctness-known day, picked by policy

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use poolcast_core::domain::{Bucket, ForecasterDayRecord, ForecasterId, QuestionId, RecordError};

use crate::config::CorrectnessKnownPolicy;
use crate::rationale::RationaleEntry;

/// Columns that must be present for loading.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "prediction set id",
    "discover question id",
    "membership guid",
    "answer sort order",
    "forecasted probability",
    "answer resolved probability",
    "created at",
];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("prediction set {set}: unparseable '{column}' timestamp '{value}'")]
    Timestamp {
        set: String,
        column: &'static str,
        value: String,
    },
    #[error("invalid record: {0}")]
    Record(#[from] RecordError),
}

/// One raw prediction row: one bucket of one prediction set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPrediction {
    #[serde(rename = "prediction set id")]
    pub prediction_set_id: String,
    #[serde(rename = "discover question id")]
    pub question_id: String,
    #[serde(rename = "membership guid")]
    pub forecaster_id: String,
    #[serde(rename = "answer sort order")]
    pub answer_sort_order: Bucket,
    #[serde(rename = "forecasted probability")]
    pub forecasted_probability: f64,
    #[serde(rename = "answer resolved probability")]
    pub resolved_probability: Option<f64>,
    #[serde(rename = "created at")]
    pub created_at: String,
    #[serde(
        rename = "answer correctness_known_at",
        alias = "answer correctness known at",
        default
    )]
    pub correctness_known_at: Option<String>,
    #[serde(rename = "made after correctness known", default)]
    pub made_after_correctness_known: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl RawPrediction {
    /// Resolved probability, with NaN treated as missing.
    pub fn resolved(&self) -> Option<f64> {
        self.resolved_probability.filter(|v| !v.is_nan())
    }

    /// Only a case-insensitive "true" marks a late row; anything else keeps it.
    pub fn is_after_correctness_known(&self) -> bool {
        self.made_after_correctness_known
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

/// Raw rows plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedPredictions {
    pub rows: Vec<RawPrediction>,
    /// BLAKE3 over the raw file bytes.
    pub dataset_hash: String,
}

/// Load raw prediction rows from a CSV file.
pub fn load_predictions(path: &Path) -> Result<LoadedPredictions, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset_hash = blake3::hash(&bytes).to_hex().to_string();
    let rows = read_predictions(bytes.as_slice())?;
    tracing::info!(path = %path.display(), rows = rows.len(), "loaded predictions");
    Ok(LoadedPredictions { rows, dataset_hash })
}

/// Parse raw prediction rows from any CSV source. Header names are trimmed.
pub fn read_predictions<R: Read>(reader: R) -> Result<Vec<RawPrediction>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == **c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    rdr.deserialize()
        .collect::<Result<Vec<RawPrediction>, csv::Error>>()
        .map_err(LoadError::from)
}

/// Parse a timestamp in any of the layouts the exports use. Naive
/// timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

/// Numeric ids compare numerically, anything else lexically.
fn compare_set_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

// ─── Cleaning ────────────────────────────────────────────────────────

/// What cleaning removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_read: usize,
    /// Questions dropped entirely for lacking a resolved probability.
    pub removed_questions: Vec<String>,
    pub rows_in_removed_questions: usize,
    pub rows_after_known_removed: usize,
    /// Rows of prediction sets superseded later the same day.
    pub superseded_rows: usize,
    pub rows_after_cleaning: usize,
    pub n_questions: usize,
    pub n_forecasters: usize,
}

#[derive(Debug, Clone)]
pub struct CleanedData {
    /// Latest-set rows in input order.
    pub records: Vec<ForecasterDayRecord>,
    /// Rationale text of every row surviving steps 1–2.
    pub rationales: Vec<RationaleEntry>,
    pub report: CleaningReport,
}

/// Clean raw rows into forecaster-day records.
pub fn clean(rows: &[RawPrediction], policy: CorrectnessKnownPolicy) -> Result<CleanedData, LoadError> {
    // Step 1: unscorable questions
    let mut removed_questions: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for row in rows.iter().filter(|r| r.resolved().is_none()) {
        if seen.insert(row.question_id.as_str()) {
            removed_questions.push(row.question_id.clone());
        }
    }
    let scorable: Vec<&RawPrediction> = rows
        .iter()
        .filter(|r| !seen.contains(r.question_id.as_str()))
        .collect();
    let rows_in_removed_questions = rows.len() - scorable.len();

    // Step 2: late rows
    let (late, kept): (Vec<&RawPrediction>, Vec<&RawPrediction>) = scorable
        .into_iter()
        .partition(|r| r.is_after_correctness_known());

    // Step 3: calendar day
    let dated = kept
        .into_iter()
        .map(|r| {
            parse_timestamp(&r.created_at)
                .map(|ts| (r, ts))
                .ok_or_else(|| LoadError::Timestamp {
                    set: r.prediction_set_id.clone(),
                    column: "created at",
                    value: r.created_at.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Step 4: latest set per (question, forecaster, day)
    let mut latest: HashMap<(&str, &str, NaiveDate), (DateTime<Utc>, &str)> = HashMap::new();
    for (row, created) in &dated {
        let key = (
            row.question_id.as_str(),
            row.forecaster_id.as_str(),
            created.date_naive(),
        );
        let candidate = (*created, row.prediction_set_id.as_str());
        latest
            .entry(key)
            .and_modify(|best| {
                let later = candidate
                    .0
                    .cmp(&best.0)
                    .then_with(|| compare_set_ids(candidate.1, best.1));
                if later == Ordering::Greater {
                    *best = candidate;
                }
            })
            .or_insert(candidate);
    }
    let latest_sets: HashSet<&str> = latest.values().map(|(_, id)| *id).collect();
    let latest_rows: Vec<&(&RawPrediction, DateTime<Utc>)> = dated
        .iter()
        .filter(|(r, _)| latest_sets.contains(r.prediction_set_id.as_str()))
        .collect();

    // Step 5: correctness-known day per question
    let mut known: HashMap<&str, NaiveDate> = HashMap::new();
    for (row, _) in &latest_rows {
        let Some(raw) = row.correctness_known_at.as_deref().filter(|s| !s.trim().is_empty()) else {
            continue;
        };
        let day = parse_timestamp(raw)
            .ok_or_else(|| LoadError::Timestamp {
                set: row.prediction_set_id.clone(),
                column: "answer correctness_known_at",
                value: raw.to_string(),
            })?
            .date_naive();
        known
            .entry(row.question_id.as_str())
            .and_modify(|current| {
                *current = match policy {
                    CorrectnessKnownPolicy::Earliest => (*current).min(day),
                    CorrectnessKnownPolicy::Latest => (*current).max(day),
                }
            })
            .or_insert(day);
    }

    let records = latest_rows
        .iter()
        .map(|(row, created)| {
            ForecasterDayRecord::new(
                QuestionId::new(row.question_id.clone()),
                ForecasterId::new(row.forecaster_id.clone()),
                created.date_naive(),
                row.answer_sort_order,
                row.forecasted_probability,
                row.resolved(),
                known.get(row.question_id.as_str()).copied(),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rationales = dated
        .iter()
        .map(|(row, _)| RationaleEntry {
            forecaster: ForecasterId::new(row.forecaster_id.clone()),
            text: row.rationale.clone().unwrap_or_default(),
        })
        .collect();

    let report = CleaningReport {
        rows_read: rows.len(),
        rows_in_removed_questions,
        rows_after_known_removed: late.len(),
        superseded_rows: dated.len() - records.len(),
        rows_after_cleaning: records.len(),
        n_questions: records.iter().map(|r| &r.question).collect::<BTreeSet<_>>().len(),
        n_forecasters: records.iter().map(|r| &r.forecaster).collect::<BTreeSet<_>>().len(),
        removed_questions,
    };

    tracing::info!(
        removed_questions = report.removed_questions.len(),
        rows_in_removed_questions = report.rows_in_removed_questions,
        after_known_removed = report.rows_after_known_removed,
        superseded = report.superseded_rows,
        kept = report.rows_after_cleaning,
        from = report.rows_read,
        "cleaned predictions"
    );

    Ok(CleanedData {
        records,
        rationales,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "prediction set id,discover question id,membership guid,answer sort order,forecasted probability,answer resolved probability,created at,answer correctness_known_at,made after correctness known,rationale\n";

    fn parse(body: &str) -> Vec<RawPrediction> {
        read_predictions(format!("{HEADER}{body}").as_bytes()).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn timestamps_in_common_layouts_parse() {
        let expected = day("2023-05-01");
        for raw in [
            "2023-05-01T10:00:00Z",
            "2023-05-01T10:00:00.123+00:00",
            "2023-05-01 10:00:00+00:00",
            "2023-05-01 10:00:00.5",
            "2023-05-01T10:00:00",
            "2023-05-01",
        ] {
            assert_eq!(parse_timestamp(raw).map(|t| t.date_naive()), Some(expected), "{raw}");
        }
        assert_eq!(parse_timestamp("  "), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn offsets_shift_the_utc_day() {
        let ts = parse_timestamp("2023-05-01T23:30:00-02:00").unwrap();
        assert_eq!(ts.date_naive(), day("2023-05-02"));
    }

    #[test]
    fn headers_are_trimmed_and_missing_columns_reported() {
        let csv = " prediction set id ,discover question id\n1,q\n";
        match read_predictions(csv.as_bytes()) {
            Err(LoadError::MissingColumns(cols)) => {
                assert!(cols.contains(&"membership guid".to_string()));
                assert!(!cols.contains(&"prediction set id".to_string()));
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_questions_are_dropped_entirely() {
        let rows = parse(
            "1,q1,a,0,0.4,1,2023-01-01T09:00:00Z,,False,\n\
             1,q1,a,1,0.6,0,2023-01-01T09:00:00Z,,False,\n\
             2,q2,a,0,0.4,,2023-01-01T09:00:00Z,,False,\n\
             2,q2,a,1,0.6,1,2023-01-01T09:00:00Z,,False,\n",
        );
        let cleaned = clean(&rows, CorrectnessKnownPolicy::Earliest).unwrap();
        assert_eq!(cleaned.report.removed_questions, vec!["q2".to_string()]);
        assert_eq!(cleaned.report.rows_in_removed_questions, 2);
        assert_eq!(cleaned.records.len(), 2);
        assert!(cleaned.records.iter().all(|r| r.question.as_str() == "q1"));
    }

    #[test]
    fn late_rows_are_dropped_case_insensitively() {
        let rows = parse(
            "1,q,a,0,0.4,1,2023-01-01T09:00:00Z,,TRUE,\n\
             2,q,b,0,0.4,1,2023-01-01T09:00:00Z,, true ,\n\
             3,q,c,0,0.4,1,2023-01-01T09:00:00Z,,False,\n\
             4,q,d,0,0.4,1,2023-01-01T09:00:00Z,,,\n",
        );
        let cleaned = clean(&rows, CorrectnessKnownPolicy::Earliest).unwrap();
        assert_eq!(cleaned.report.rows_after_known_removed, 2);
        assert_eq!(cleaned.records.len(), 2);
    }

    #[test]
    fn latest_set_of_the_day_wins() {
        let rows = parse(
            "10,q,a,0,0.1,1,2023-01-01T08:00:00Z,,False,\n\
             10,q,a,1,0.9,0,2023-01-01T08:00:00Z,,False,\n\
             11,q,a,0,0.7,1,2023-01-01T20:00:00Z,,False,\n\
             11,q,a,1,0.3,0,2023-01-01T20:00:00Z,,False,\n\
             12,q,a,0,0.5,1,2023-01-02T01:00:00Z,,False,\n\
             12,q,a,1,0.5,0,2023-01-02T01:00:00Z,,False,\n",
        );
        let cleaned = clean(&rows, CorrectnessKnownPolicy::Earliest).unwrap();
        assert_eq!(cleaned.report.superseded_rows, 2);
        let day1: Vec<f64> = cleaned
            .records
            .iter()
            .filter(|r| r.day == day("2023-01-01"))
            .map(|r| r.probability)
            .collect();
        assert_eq!(day1, vec![0.7, 0.3]);
    }

    #[test]
    fn equal_timestamps_break_ties_on_numeric_set_id() {
        let rows = parse(
            "9,q,a,0,0.2,1,2023-01-01T08:00:00Z,,False,\n\
             10,q,a,0,0.8,1,2023-01-01T08:00:00Z,,False,\n",
        );
        let cleaned = clean(&rows, CorrectnessKnownPolicy::Earliest).unwrap();
        assert_eq!(cleaned.records.len(), 1);
        assert_eq!(cleaned.records[0].probability, 0.8);
    }

    #[test]
    fn correctness_known_day_follows_policy() {
        let body = "1,q,a,0,0.5,1,2023-01-01T08:00:00Z,2023-02-10T12:00:00Z,False,\n\
                    2,q,b,0,0.5,1,2023-01-01T08:00:00Z,2023-02-03T12:00:00Z,False,\n";
        let rows = parse(body);
        let earliest = clean(&rows, CorrectnessKnownPolicy::Earliest).unwrap();
        assert!(earliest
            .records
            .iter()
            .all(|r| r.correctness_known_day == Some(day("2023-02-03"))));
        let latest = clean(&rows, CorrectnessKnownPolicy::Latest).unwrap();
        assert!(latest
            .records
            .iter()
            .all(|r| r.correctness_known_day == Some(day("2023-02-10"))));
    }

    #[test]
    fn rationale_entries_cover_all_surviving_rows() {
        let rows = parse(
            "1,q,a,0,0.1,1,2023-01-01T08:00:00Z,,False,base rate\n\
             2,q,a,0,0.2,1,2023-01-01T09:00:00Z,,False,\n",
        );
        let cleaned = clean(&rows, CorrectnessKnownPolicy::Earliest).unwrap();
        assert_eq!(cleaned.records.len(), 1);
        assert_eq!(cleaned.rationales.len(), 2);
        assert_eq!(cleaned.rationales[0].text, "base rate");
        assert_eq!(cleaned.rationales[1].text, "");
    }

    #[test]
    fn bad_created_at_is_fatal() {
        let rows = parse("1,q,a,0,0.1,1,not a date,,False,\n");
        assert!(matches!(
            clean(&rows, CorrectnessKnownPolicy::Earliest),
            Err(LoadError::Timestamp { column: "created at", .. })
        ));
    }
}
