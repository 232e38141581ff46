//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for analysis results:
//! - **JSON**: run manifest with schema versioning
//! - **CSV**: every stage table (snapshots, aggregates, scores, summaries)
//! - **Markdown**: the cross-variant comparison table
//!
//! Undefined values are written as empty CSV cells and as `—` in Markdown.
//! Persisted manifests carry a `schema_version`; newer versions are rejected
//! on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use poolcast_core::domain::{
    AggregateRow, DayScore, ForecasterDayScore, ForecasterRanking, ForecasterSummary, Method,
    Snapshot,
};
use poolcast_core::{EstimatorConfig, IndividualScores, QuestionSummary, SummaryScope};

use crate::config::AnalysisConfig;
use crate::data_loader::CleaningReport;
use crate::pipeline::{Notice, VariantResult};
use crate::runner::{AnalysisResult, SCHEMA_VERSION};
use crate::summary::{ComparisonTable, SummaryRow};
use crate::trimming::TrimOutcome;

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON manifest ──────────────────────────────────────────────────

/// Per-variant section of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantManifest {
    pub label: String,
    pub max_staleness_days: Option<u32>,
    pub question_days: usize,
    pub summary: Vec<SummaryRow>,
    pub notices: Vec<Notice>,
    pub trim: Option<TrimOutcome>,
}

impl From<&VariantResult> for VariantManifest {
    fn from(v: &VariantResult) -> Self {
        Self {
            label: v.label.clone(),
            max_staleness_days: v.max_staleness_days,
            question_days: v.day_scores.len(),
            summary: v.summary.clone(),
            notices: v.notices.clone(),
            trim: v.trim.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub input: Option<PathBuf>,
    pub dataset_hash: String,
    pub config: AnalysisConfig,
    pub cleaning: CleaningReport,
    pub variants: Vec<VariantManifest>,
    pub comparison: ComparisonTable,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunManifest {
    pub fn from_result(result: &AnalysisResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: chrono::Utc::now(),
            input: result.input.clone(),
            dataset_hash: result.dataset_hash.clone(),
            config: result.config.clone(),
            cleaning: result.cleaning.clone(),
            variants: result.variants.iter().map(VariantManifest::from).collect(),
            comparison: result.comparison.clone(),
        }
    }
}

pub fn export_manifest_json(manifest: &RunManifest) -> Result<String> {
    serde_json::to_string_pretty(manifest).context("failed to serialize run manifest to JSON")
}

/// Deserialize a manifest, rejecting unknown schema versions.
pub fn import_manifest_json(json: &str) -> Result<RunManifest> {
    let manifest: RunManifest =
        serde_json::from_str(json).context("failed to deserialize run manifest from JSON")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: question_id, forecaster_id, day, bucket, probability,
/// resolved_probability, correctness_known_day
pub fn export_snapshots_csv(snapshots: &[Snapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "question_id",
        "forecaster_id",
        "day",
        "bucket",
        "probability",
        "resolved_probability",
        "correctness_known_day",
    ])?;
    for s in snapshots {
        wtr.write_record([
            s.question.as_str(),
            s.forecaster.as_str(),
            &s.day.to_string(),
            &s.bucket.to_string(),
            &format!("{:.6}", s.probability),
            &opt(s.resolved_probability),
            &s.correctness_known_day.map(|d| d.to_string()).unwrap_or_default(),
        ])?;
    }
    finish(wtr)
}

/// Columns: question_id, day, bucket, one pooled column per method,
/// n_forecasters, resolved_probability
pub fn export_aggregates_csv(rows: &[AggregateRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["question_id", "day", "bucket"];
    header.extend(Method::ALL.iter().map(|m| m.column()));
    header.extend(["n_forecasters", "resolved_probability"]);
    wtr.write_record(&header)?;

    for r in rows {
        let mut record = vec![r.question.to_string(), r.day.to_string(), r.bucket.to_string()];
        record.extend(Method::ALL.iter().map(|&m| opt(*r.pooled.get(m))));
        record.push(r.n_forecasters.to_string());
        record.push(opt(r.resolved_probability));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

fn score_header(leading: &[&str]) -> Vec<String> {
    leading
        .iter()
        .map(|s| s.to_string())
        .chain(Method::ALL.iter().map(|m| format!("brier_{}", m.key())))
        .collect()
}

/// Columns: question_id, day, brier_<method> per method
pub fn export_day_scores_csv(scores: &[DayScore]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(score_header(&["question_id", "day"]))?;
    for s in scores {
        let mut record = vec![s.question.to_string(), s.day.to_string()];
        record.extend(Method::ALL.iter().map(|&m| opt(*s.scores.get(m))));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Per-question averages; the overall row has question_id `ALL`.
pub fn export_question_summary_csv(summary: &[QuestionSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(score_header(&["question_id", "n_days"]))?;
    for s in summary {
        let id = match &s.scope {
            SummaryScope::Question(q) => q.to_string(),
            SummaryScope::Overall => "ALL".to_string(),
        };
        let mut record = vec![id, s.n_days.to_string()];
        record.extend(Method::ALL.iter().map(|&m| opt(*s.scores.get(m))));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Columns: method, mean, std_dev, n
pub fn export_summary_csv(rows: &[SummaryRow], estimators: &EstimatorConfig) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["method", "mean", "std_dev", "n"])?;
    for r in rows {
        wtr.write_record([
            &estimators.label(r.method),
            &opt(r.mean),
            &opt(r.std_dev),
            &r.n.to_string(),
        ])?;
    }
    finish(wtr)
}

/// One row per (question, forecaster, day) with that day's Brier score.
pub fn export_forecaster_days_csv(rows: &[ForecasterDayScore]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["question_id", "forecaster_id", "day", "correctness_known_day", "brier"])?;
    for r in rows {
        wtr.write_record([
            r.question.as_str(),
            r.forecaster.as_str(),
            &r.day.to_string(),
            &r.correctness_known_day.map(|d| d.to_string()).unwrap_or_default(),
            &format!("{:.6}", r.brier),
        ])?;
    }
    finish(wtr)
}

/// One row per (question, forecaster).
pub fn export_individuals_csv(rows: &[ForecasterRanking]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "question_id",
        "forecaster_id",
        "avg_brier",
        "n_days",
        "total_days",
        "participation_rate",
        "adjusted_brier",
    ])?;
    for r in rows {
        wtr.write_record([
            r.question.as_str(),
            r.forecaster.as_str(),
            &format!("{:.6}", r.avg_brier),
            &r.n_days.to_string(),
            &r.total_days.to_string(),
            &format!("{:.6}", r.participation_rate),
            &opt(r.adjusted_brier),
        ])?;
    }
    finish(wtr)
}

/// One row per forecaster.
pub fn export_forecaster_summary_csv(rows: &[ForecasterSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "forecaster_id",
        "avg_brier",
        "avg_adjusted_brier",
        "n_questions",
        "n_days",
        "mean_participation",
    ])?;
    for r in rows {
        wtr.write_record([
            r.forecaster.as_str(),
            &format!("{:.6}", r.avg_brier),
            &opt(r.avg_adjusted_brier),
            &r.n_questions.to_string(),
            &r.n_days.to_string(),
            &format!("{:.6}", r.mean_participation),
        ])?;
    }
    finish(wtr)
}

/// Columns: method, then one column per variant label.
pub fn export_comparison_csv(table: &ComparisonTable, estimators: &EstimatorConfig) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["method".to_string()];
    header.extend(table.labels.iter().cloned());
    wtr.write_record(&header)?;
    for row in &table.rows {
        let mut record = vec![estimators.label(row.method)];
        record.extend(row.means.iter().map(|&m| opt(m)));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

// ─── Markdown ───────────────────────────────────────────────────────

fn md(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "—".to_string())
}

/// Markdown table of mean Ordered Brier per method and variant.
pub fn comparison_markdown(table: &ComparisonTable, estimators: &EstimatorConfig) -> String {
    let mut out = String::new();
    out.push_str("| Method |");
    for label in &table.labels {
        out.push_str(&format!(" {label} |"));
    }
    out.push_str("\n|---|");
    for _ in &table.labels {
        out.push_str("---:|");
    }
    out.push('\n');
    for row in &table.rows {
        out.push_str(&format!("| {} |", estimators.label(row.method)));
        for &m in &row.means {
            out.push_str(&format!(" {} |", md(m)));
        }
        out.push('\n');
    }
    out
}

/// Markdown summary of one variant: compact table plus notices.
pub fn variant_markdown(variant: &VariantResult, estimators: &EstimatorConfig) -> String {
    let mut out = format!("## {}\n\n", variant.label);
    out.push_str("| Method | Ordered Brier (avg) | Std dev | N question-days |\n");
    out.push_str("|---|---:|---:|---:|\n");
    for r in &variant.summary {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            estimators.label(r.method),
            md(r.mean),
            md(r.std_dev),
            r.n
        ));
    }
    if let Some(trim) = &variant.trim {
        out.push_str(&format!(
            "\nFreeze day {} ({:.0}% resolved), {} forecasters excluded.\n",
            trim.freeze.day,
            trim.freeze.resolved_fraction * 100.0,
            trim.excluded.len()
        ));
    }
    for notice in &variant.notices {
        out.push_str(&format!("\n> {notice}\n"));
    }
    out
}

// ─── Artifact bundle ────────────────────────────────────────────────

fn write(path: PathBuf, content: &str) -> Result<()> {
    std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Save the full artifact set for an analysis run.
///
/// Creates `poolcast_{timestamp}/` under `output_dir` containing
/// `manifest.json`, `comparison.csv`, `comparison.md`, and one
/// subdirectory per variant with `snapshots.csv`, `aggregates.csv`,
/// `day_scores.csv`, `question_scores.csv`, `summary.csv`, and
/// `summary.md`.
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &AnalysisResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!("poolcast_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let estimators = &result.config.estimators;
    let manifest = RunManifest::from_result(result);
    write(run_dir.join("manifest.json"), &export_manifest_json(&manifest)?)?;
    write(
        run_dir.join("comparison.csv"),
        &export_comparison_csv(&result.comparison, estimators)?,
    )?;
    write(
        run_dir.join("comparison.md"),
        &comparison_markdown(&result.comparison, estimators),
    )?;

    for v in &result.variants {
        let dir = run_dir.join(&v.label);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;
        write(dir.join("snapshots.csv"), &export_snapshots_csv(&v.snapshots)?)?;
        write(dir.join("aggregates.csv"), &export_aggregates_csv(&v.aggregates)?)?;
        write(dir.join("day_scores.csv"), &export_day_scores_csv(&v.day_scores)?)?;
        write(
            dir.join("question_scores.csv"),
            &export_question_summary_csv(&v.question_summary)?,
        )?;
        write(dir.join("summary.csv"), &export_summary_csv(&v.summary, estimators)?)?;
        write(dir.join("summary.md"), &variant_markdown(v, estimators))?;
    }

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Save individual scores under `output`: `individual_daily.csv`,
/// `individual_per_question.csv`, and `individual_per_forecaster.csv`.
///
/// Returns the written paths in that order.
pub fn save_individuals(scores: &IndividualScores, output: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create output dir: {}", output.display()))?;

    let daily = output.join("individual_daily.csv");
    write(daily.clone(), &export_forecaster_days_csv(&scores.daily)?)?;
    let per_question = output.join("individual_per_question.csv");
    write(per_question.clone(), &export_individuals_csv(&scores.per_question)?)?;
    let per_forecaster = output.join("individual_per_forecaster.csv");
    write(
        per_forecaster.clone(),
        &export_forecaster_summary_csv(&scores.per_forecaster)?,
    )?;

    tracing::info!(dir = %output.display(), rows = scores.daily.len(), "individual scores saved");
    Ok(vec![daily, per_question, per_forecaster])
}

/// Load a manifest from an artifact directory. Rejects unknown schema versions.
pub fn load_manifest(dir: &Path) -> Result<RunManifest> {
    let path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_manifest_json(&json)
}
