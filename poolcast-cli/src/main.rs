//! Poolcast CLI — consensus evaluation, data checks, and individual scores.
//!
//! Commands:
//! - `run` — clean a prediction CSV, run every configured variant, save artifacts
//! - `check` — data-quality report over a raw prediction CSV
//! - `individuals` — per-forecaster Ordered Brier with participation adjustment

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use poolcast_core::score_individuals;
use poolcast_runner::export::{comparison_markdown, save_individuals};
use poolcast_runner::{
    load_cleaned, run_analysis, run_checks_file, save_artifacts, AnalysisConfig, AnalysisResult,
    CorrectnessKnownPolicy,
};

#[derive(Parser)]
#[command(
    name = "poolcast",
    about = "Poolcast CLI — forecast consensus evaluation with ordered Brier scoring"
)]
struct Cli {
    /// Log filter (e.g. `debug`, `poolcast_runner=trace`). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured variant and save the artifact set.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Prediction CSV. Overrides [input].path from the config.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "artifacts")]
        output_dir: PathBuf,
    },
    /// Data-quality checks over a raw prediction CSV.
    Check {
        /// Prediction CSV to inspect.
        #[arg(long)]
        input: PathBuf,

        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Score each forecaster individually.
    Individuals {
        /// Prediction CSV.
        #[arg(long)]
        input: PathBuf,

        /// Evict estimates older than this many days. Omit for no limit.
        #[arg(long)]
        max_staleness_days: Option<u32>,

        /// Which correctness-known timestamp wins when a question has several.
        #[arg(long, value_enum, default_value_t = Policy::Earliest)]
        policy: Policy,

        /// Output directory for the CSVs.
        #[arg(long, default_value = "individuals")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    Earliest,
    Latest,
}

impl From<Policy> for CorrectnessKnownPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Earliest => CorrectnessKnownPolicy::Earliest,
            Policy::Latest => CorrectnessKnownPolicy::Latest,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Run {
            config,
            input,
            output_dir,
        } => run_cmd(config.as_deref(), input.as_deref(), &output_dir),
        Commands::Check { input, json } => check_cmd(&input, json),
        Commands::Individuals {
            input,
            max_staleness_days,
            policy,
            output,
        } => individuals_cmd(&input, max_staleness_days, policy.into(), &output),
    }
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid --log-level '{directives}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_cmd(config_path: Option<&Path>, input: Option<&Path>, output_dir: &Path) -> Result<()> {
    let config = match config_path {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    let result = run_analysis(&config, input)?;
    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn print_summary(result: &AnalysisResult) {
    let c = &result.cleaning;
    println!(
        "Rows: {} read, {} after cleaning ({} questions, {} forecasters)",
        c.rows_read, c.rows_after_cleaning, c.n_questions, c.n_forecasters
    );
    for v in &result.variants {
        for notice in &v.notices {
            println!("[{}] {notice}", v.label);
        }
        if let Some(trim) = &v.trim {
            println!(
                "[{}] freeze day {} ({:.0}% resolved), excluded {}/{} ranked forecasters",
                v.label,
                trim.freeze.day,
                trim.freeze.resolved_fraction * 100.0,
                trim.excluded.len(),
                trim.ranked.len()
            );
        }
    }
    println!();
    println!("Average Ordered Brier by method (lower is better)");
    print!(
        "{}",
        comparison_markdown(&result.comparison, &result.config.estimators)
    );
    println!();
}

fn check_cmd(input: &Path, json: bool) -> Result<()> {
    let report = run_checks_file(input)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Data checks: {}", input.display());
        print!("{report}");
    }
    if report.is_fatal() {
        std::process::exit(1);
    }
    Ok(())
}

fn individuals_cmd(
    input: &Path,
    max_staleness_days: Option<u32>,
    policy: CorrectnessKnownPolicy,
    output: &Path,
) -> Result<()> {
    let (cleaned, _) = load_cleaned(input, policy)?;
    let scores = score_individuals(&cleaned.records, max_staleness_days)?;

    let saved = save_individuals(&scores, output)?;

    println!(
        "Scored {} forecasters on {} (question, forecaster) pairs",
        scores.per_forecaster.len(),
        scores.per_question.len()
    );
    println!();
    println!("Top forecasters by adjusted Brier");
    println!("{:<38} {:>10} {:>12} {:>6}", "Forecaster", "Avg Brier", "Adjusted", "Qs");
    println!("{}", "-".repeat(70));
    let mut best: Vec<_> = scores.per_forecaster.iter().collect();
    best.sort_by(|a, b| {
        let a = a.avg_adjusted_brier.unwrap_or(f64::INFINITY);
        let b = b.avg_adjusted_brier.unwrap_or(f64::INFINITY);
        a.total_cmp(&b)
    });
    for s in best.into_iter().take(10) {
        let adjusted = s
            .avg_adjusted_brier
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "—".into());
        println!(
            "{:<38} {:>10.4} {:>12} {:>6}",
            s.forecaster.as_str(),
            s.avg_brier,
            adjusted,
            s.n_questions
        );
    }
    println!();
    for path in &saved {
        println!("Saved: {}", path.display());
    }
    Ok(())
}
