//! Reduction of sub-task results into one consolidated view

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use super::result::{SubTaskOutcome, INSUFFICIENT_INFORMATION};
use crate::domain::text::truncate_chars;

/// Summary used when every successful sub-task lacked one
pub const DEFAULT_SUMMARY: &str = "Analysis completed";

/// Maximum characters of the consolidated summary
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Number of sub-task summaries stitched into the consolidated one
pub const SUMMARY_SOURCES: usize = 3;

/// Upper bounds on each consolidated list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCaps {
    pub key_insights: usize,
    pub strengths: usize,
    pub weaknesses: usize,
    pub opportunities: usize,
    pub risks: usize,
}

impl Default for ListCaps {
    fn default() -> Self {
        Self {
            key_insights: 10,
            strengths: 8,
            weaknesses: 8,
            opportunities: 6,
            risks: 8,
        }
    }
}

/// Lowercase, collapse whitespace and drop trailing punctuation
pub fn normalize_item(item: &str) -> String {
    item.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['.', ',', ';', '!', ':'])
        .to_string()
}

/// Order-preserving dedup on normalized text.
///
/// Items whose normalized form has `min_chars` characters or fewer are dropped.
pub fn dedup_normalized<I>(items: I, min_chars: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();

    for item in items {
        let normalized = normalize_item(&item);
        if normalized.chars().count() <= min_chars {
            continue;
        }
        if seen.insert(normalized) {
            unique.push(item.trim().to_string());
        }
    }

    unique
}

/// Stitch the first few real summaries together, bounded in length
pub fn merge_summaries(outcomes: &[SubTaskOutcome]) -> String {
    let parts: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.is_success())
        .filter_map(|o| o.result.summary.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != INSUFFICIENT_INFORMATION)
        .take(SUMMARY_SOURCES)
        .collect();

    if parts.is_empty() {
        return DEFAULT_SUMMARY.to_string();
    }

    let joined = parts
        .iter()
        .map(|p| p.trim_end_matches('.'))
        .collect::<Vec<_>>()
        .join(". ");

    truncate_chars(&joined, SUMMARY_MAX_CHARS).to_string()
}

/// Labelled lists gathered from successful sub-tasks, in sub-task order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedLists {
    pub key_insights: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
}

impl CollectedLists {
    pub fn gather(outcomes: &[SubTaskOutcome]) -> Self {
        let mut lists = Self::default();

        for outcome in outcomes.iter().filter(|o| o.is_success()) {
            let result = &outcome.result;
            lists.key_insights.extend(result.key_insights.iter().cloned());
            lists.strengths.extend(result.strengths.iter().cloned());
            lists.weaknesses.extend(result.weaknesses.iter().cloned());
            lists.opportunities.extend(result.opportunities.iter().cloned());
            lists.risks.extend(result.risks.iter().cloned());
        }

        lists
    }
}

/// Collapses duplicate list items and applies a cap
#[async_trait]
pub trait Deduplicator: Send + Sync + Debug {
    async fn dedup(&self, label: &str, items: Vec<String>, cap: usize) -> Vec<String>;
}

/// Exact match after normalization
#[derive(Debug, Clone)]
pub struct NormalizedDeduplicator {
    min_chars: usize,
}

impl NormalizedDeduplicator {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl Default for NormalizedDeduplicator {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl Deduplicator for NormalizedDeduplicator {
    async fn dedup(&self, _label: &str, items: Vec<String>, cap: usize) -> Vec<String> {
        let mut unique = dedup_normalized(items, self.min_chars);
        unique.truncate(cap);
        unique
    }
}
