//! Infrastructure services

mod evaluation_service;
mod fan_out;
mod market_service;
mod prompts;
mod question_service;
mod scoring_service;
mod semantic_dedup;

#[cfg(test)]
pub(crate) mod test_support;

pub use evaluation_service::{EvaluationConfig, EvaluationService};
pub use fan_out::{fan_out, UnitResult};
pub use market_service::{MarketAnalysisService, MarketConfig};
pub use question_service::{
    Answer, QuestionConfig, QuestionRecord, QuestionService, ANSWER_FAILED, INSUFFICIENT_ANSWER,
};
pub use scoring_service::{ScoringConfig, ScoringService};
pub use semantic_dedup::SemanticDeduplicator;
