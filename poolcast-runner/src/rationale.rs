//! Rationale keyword filter — narrows the forecaster pool before aggregation.
//!
//! A forecaster is kept when at least `min_hits` of their rationale rows
//! mention one of the configured keywords. Matching is case-insensitive at
//! word boundaries; a space inside a keyword also matches a hyphen or
//! nothing, and a plural suffix is accepted ("base-rates", "reference
//! classes").

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use poolcast_core::domain::{ForecasterDayRecord, ForecasterId};

#[derive(Debug, Error)]
pub enum RationaleError {
    #[error("rationale filter has no keywords")]
    NoKeywords,
    #[error("invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RationaleConfig {
    pub enabled: bool,
    pub label: String,
    /// Staleness window of the filtered run. Omitted = unlimited.
    pub max_staleness_days: Option<u32>,
    pub min_hits: usize,
    pub keywords: Vec<String>,
}

impl Default for RationaleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            label: "nostale_rationale".to_string(),
            max_staleness_days: None,
            min_hits: 1,
            keywords: vec!["base rate".to_string(), "reference class".to_string()],
        }
    }
}

/// One rationale text attributed to a forecaster (one per cleaned input row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RationaleEntry {
    pub forecaster: ForecasterId,
    pub text: String,
}

/// Filtered records plus how many forecasters the filter removed.
#[derive(Debug, Clone, PartialEq)]
pub struct RationaleReport {
    pub records: Vec<ForecasterDayRecord>,
    pub kept: usize,
    pub removed: usize,
    /// Distinct forecasters in the rationale source.
    pub total: usize,
}

/// Build the alternation pattern for `keywords`.
pub fn keyword_pattern(keywords: &[String]) -> Result<Regex, RationaleError> {
    let alternatives: Vec<String> = keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .map(|k| {
            let words: Vec<&str> = k.split_whitespace().collect();
            let suffix = words.last().map_or("s?", |w| plural_suffix(w));
            let escaped: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
            format!(r"\b{}{suffix}\b", escaped.join(r"[-\s]?"))
        })
        .collect();
    if alternatives.is_empty() {
        return Err(RationaleError::NoKeywords);
    }
    Ok(Regex::new(&format!("(?i){}", alternatives.join("|")))?)
}

/// English plural of the last keyword word: sibilant endings take "es".
fn plural_suffix(word: &str) -> &'static str {
    let w = word.to_ascii_lowercase();
    if ["s", "x", "z", "ch", "sh"].iter().any(|end| w.ends_with(end)) {
        "(?:es)?"
    } else {
        "s?"
    }
}

#[derive(Debug, Clone)]
pub struct RationaleFilter {
    pattern: Regex,
    min_hits: usize,
}

impl RationaleFilter {
    pub fn new(keywords: &[String], min_hits: usize) -> Result<Self, RationaleError> {
        Ok(Self {
            pattern: keyword_pattern(keywords)?,
            min_hits,
        })
    }

    pub fn from_config(config: &RationaleConfig) -> Result<Self, RationaleError> {
        Self::new(&config.keywords, config.min_hits)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Forecasters with at least `min_hits` matching rationale rows.
    pub fn keyword_forecasters(&self, entries: &[RationaleEntry]) -> BTreeSet<ForecasterId> {
        let mut hits: BTreeMap<&ForecasterId, usize> = BTreeMap::new();
        for entry in entries {
            let count = hits.entry(&entry.forecaster).or_default();
            if self.matches(&entry.text) {
                *count += 1;
            }
        }
        hits.into_iter()
            .filter(|&(_, n)| n >= self.min_hits)
            .map(|(f, _)| f.clone())
            .collect()
    }

    /// Keep only the records of forecasters selected from `entries`.
    pub fn apply(&self, records: &[ForecasterDayRecord], entries: &[RationaleEntry]) -> RationaleReport {
        let keep = self.keyword_forecasters(entries);
        let total = entries
            .iter()
            .map(|e| &e.forecaster)
            .collect::<BTreeSet<_>>()
            .len();
        let removed = total.saturating_sub(keep.len());

        if total > 0 {
            tracing::info!(
                removed,
                total,
                pct_removed = removed as f64 / total as f64 * 100.0,
                "rationale filter applied"
            );
        } else {
            tracing::warn!("no forecasters found to filter by rationale");
        }

        RationaleReport {
            records: records
                .iter()
                .filter(|r| keep.contains(&r.forecaster))
                .cloned()
                .collect(),
            kept: keep.len(),
            removed,
            total,
        }
    }
}
