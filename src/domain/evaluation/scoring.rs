//! Weighted numeric scoring across categories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::ConfidenceLevel;
use crate::domain::context::EntityId;
use crate::domain::storage::StorageEntity;
use crate::domain::structured::{FieldSpec, RecordSchema, StructuredRecord, NEUTRAL_SCORE};

pub const FIELD_SCORE: &str = "score";
pub const FIELD_JUSTIFICATION: &str = "justification";
pub const FIELD_KEY_FACTORS: &str = "key_factors";

/// Fields requested from the model for each scoring category
pub fn score_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldSpec::number(FIELD_SCORE),
        FieldSpec::text(FIELD_JUSTIFICATION),
        FieldSpec::list(FIELD_KEY_FACTORS),
    ])
}

/// Clamp into [0, 100]; non-finite values become neutral
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// How a category's score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Scored,
    InsufficientContext,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub weight: f64,
    pub score: f64,
    pub justification: Option<String>,
    pub key_factors: Vec<String>,
    pub status: CategoryStatus,
    pub context_chars: usize,
}

impl CategoryScore {
    pub fn from_record(
        category: impl Into<String>,
        weight: f64,
        record: &StructuredRecord,
        context_chars: usize,
    ) -> Self {
        Self {
            category: category.into(),
            weight,
            score: clamp_score(record.number(FIELD_SCORE).unwrap_or(NEUTRAL_SCORE)),
            justification: record.text(FIELD_JUSTIFICATION).map(str::to_string),
            key_factors: record.list_or_empty(FIELD_KEY_FACTORS),
            status: CategoryStatus::Scored,
            context_chars,
        }
    }

    /// Neutral score standing in for a category that could not be judged
    pub fn neutral(
        category: impl Into<String>,
        weight: f64,
        status: CategoryStatus,
        context_chars: usize,
    ) -> Self {
        let justification = match status {
            CategoryStatus::InsufficientContext => "Insufficient information to score",
            _ => "Scoring failed; neutral score applied",
        };

        Self {
            category: category.into(),
            weight,
            score: NEUTRAL_SCORE,
            justification: Some(justification.to_string()),
            key_factors: Vec::new(),
            status,
            context_chars,
        }
    }

    pub fn had_context(&self) -> bool {
        self.status != CategoryStatus::InsufficientContext
    }
}

/// Sum of each score times its weight
pub fn weighted_sum(scores: &[CategoryScore]) -> f64 {
    scores.iter().map(|s| s.score * s.weight).sum()
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Two decimals, trailing zeros trimmed
pub fn format_score(score: f64) -> String {
    let formatted = format!("{:.2}", score);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Deterministic memo listing the strongest three and the weakest category
pub fn fallback_reasoning(entity_name: &str, overall: f64, scores: &[CategoryScore]) -> String {
    let mut ranked: Vec<&CategoryScore> = scores.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let top = ranked
        .iter()
        .take(3)
        .map(|s| format!("{} ({})", s.category, format_score(s.score)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut memo = format!(
        "{} received an overall score of {}/100. Strongest areas: {}.",
        entity_name,
        format_score(overall),
        top
    );

    if let Some(lowest) = ranked.last() {
        memo.push_str(&format!(
            " Area needing the most attention: {} ({}).",
            lowest.category,
            format_score(lowest.score)
        ));
    }

    memo
}

/// Result of a scoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub run_id: String,
    pub entity_id: EntityId,
    pub overall_score: f64,
    pub category_scores: Vec<CategoryScore>,
    pub std_dev: f64,
    pub confidence: ConfidenceLevel,
    pub reasoning: String,
    pub scored_at: DateTime<Utc>,
}

impl ScoreCard {
    pub fn category(&self, id: &str) -> Option<&CategoryScore> {
        self.category_scores.iter().find(|c| c.category == id)
    }
}

impl StorageEntity for ScoreCard {
    type Key = String;

    fn key(&self) -> &Self::Key {
        &self.run_id
    }
}
