//! Sub-task and consolidated evaluation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::RunState;
use crate::domain::context::EntityId;
use crate::domain::storage::StorageEntity;
use crate::domain::structured::{FieldSpec, ParseStage, RecordSchema, StructuredRecord};

/// Summary used when a topic had too little context or its generation failed
pub const INSUFFICIENT_INFORMATION: &str = "Insufficient information";

pub const FIELD_SUMMARY: &str = "summary";
pub const FIELD_KEY_INSIGHTS: &str = "key_insights";
pub const FIELD_STRENGTHS: &str = "strengths";
pub const FIELD_WEAKNESSES: &str = "weaknesses";
pub const FIELD_OPPORTUNITIES: &str = "opportunities";
pub const FIELD_RISKS: &str = "risks";

/// Fields requested from the model for each analysis topic
pub fn insight_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldSpec::text(FIELD_SUMMARY),
        FieldSpec::list(FIELD_KEY_INSIGHTS),
        FieldSpec::list(FIELD_STRENGTHS),
        FieldSpec::list(FIELD_WEAKNESSES),
        FieldSpec::list(FIELD_OPPORTUNITIES),
        FieldSpec::list(FIELD_RISKS),
    ])
}

/// Structured judgment for one topic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    pub summary: Option<String>,
    pub key_insights: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
}

impl InsightRecord {
    pub fn placeholder() -> Self {
        Self {
            summary: Some(INSUFFICIENT_INFORMATION.to_string()),
            ..Default::default()
        }
    }

    pub fn from_record(record: &StructuredRecord) -> Self {
        Self {
            summary: record
                .text(FIELD_SUMMARY)
                .map(str::to_string)
                .filter(|s| !s.trim().is_empty()),
            key_insights: record.list_or_empty(FIELD_KEY_INSIGHTS),
            strengths: record.list_or_empty(FIELD_STRENGTHS),
            weaknesses: record.list_or_empty(FIELD_WEAKNESSES),
            opportunities: record.list_or_empty(FIELD_OPPORTUNITIES),
            risks: record.list_or_empty(FIELD_RISKS),
        }
    }
}

/// How a single sub-task ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubTaskStatus {
    Completed,
    InsufficientContext,
    Failed { reason: String },
    /// Never dispatched because the run was cancelled
    Skipped,
}

/// Output of one sub-task; failed ones carry the placeholder record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskOutcome {
    pub topic_id: String,
    #[serde(flatten)]
    pub status: SubTaskStatus,
    pub result: InsightRecord,
    pub context_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_stage: Option<ParseStage>,
}

impl SubTaskOutcome {
    pub fn completed(
        topic_id: impl Into<String>,
        result: InsightRecord,
        context_chars: usize,
        parse_stage: ParseStage,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            status: SubTaskStatus::Completed,
            result,
            context_chars,
            parse_stage: Some(parse_stage),
        }
    }

    pub fn insufficient(topic_id: impl Into<String>, context_chars: usize) -> Self {
        Self {
            topic_id: topic_id.into(),
            status: SubTaskStatus::InsufficientContext,
            result: InsightRecord::placeholder(),
            context_chars,
            parse_stage: None,
        }
    }

    pub fn failed(topic_id: impl Into<String>, reason: impl Into<String>, context_chars: usize) -> Self {
        Self {
            topic_id: topic_id.into(),
            status: SubTaskStatus::Failed {
                reason: reason.into(),
            },
            result: InsightRecord::placeholder(),
            context_chars,
            parse_stage: None,
        }
    }

    pub fn skipped(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            status: SubTaskStatus::Skipped,
            result: InsightRecord::placeholder(),
            context_chars: 0,
            parse_stage: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SubTaskStatus::Completed
    }
}

/// Coarse confidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Bucket by the share of sub-tasks that succeeded
    pub fn from_success_ratio(ratio: f64) -> Self {
        if ratio >= 0.8 {
            Self::High
        } else if ratio >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Bucket by the spread of category scores
    pub fn from_std_dev(std_dev: f64) -> Self {
        if std_dev < 10.0 {
            Self::High
        } else if std_dev < 20.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Bookkeeping attached to a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub entity_id: EntityId,
    pub state: RunState,
    pub attempted: usize,
    pub succeeded: usize,
    pub insufficient_context: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Characters of retrieved context across all sub-tasks
    pub context_chars: usize,
    /// Characters of external validation evidence; zero when unavailable
    pub evidence_chars: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunMetadata {
    pub fn success_ratio(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.attempted as f64
        }
    }
}

/// Deduplicated, bounded reduction of every sub-task of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub summary: String,
    pub key_insights: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    pub confidence: ConfidenceLevel,
    pub confidence_ratio: f64,
    pub sub_tasks: Vec<SubTaskOutcome>,
    pub metadata: RunMetadata,
}

impl StorageEntity for ConsolidatedResult {
    type Key = String;

    fn key(&self) -> &Self::Key {
        &self.metadata.run_id
    }
}
