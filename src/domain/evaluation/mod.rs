//! Evaluation domain - topics, run lifecycle, results, scoring and market sizing

mod consolidate;
mod error;
mod market;
mod result;
mod run;
mod scoring;
mod topic;

pub use consolidate::{
    dedup_normalized, merge_summaries, normalize_item, CollectedLists, Deduplicator, ListCaps,
    NormalizedDeduplicator, DEFAULT_SUMMARY, SUMMARY_MAX_CHARS,
};
pub use error::EvaluationError;
pub use market::{
    claimed_market_schema, inflation_ratio, validated_market_schema, ClaimedMarket,
    MarketAnalysis, MarketSizes, SizingVerdict, ValidatedMarket, GROWTH_UNAVAILABLE,
    VALIDATION_UNAVAILABLE,
};
pub use result::{
    insight_schema, ConfidenceLevel, ConsolidatedResult, InsightRecord, RunMetadata,
    SubTaskOutcome, SubTaskStatus, INSUFFICIENT_INFORMATION,
};
pub use run::{CancellationFlag, RunState};
pub use scoring::{
    clamp_score, fallback_reasoning, format_score, score_schema, std_dev, weighted_sum,
    CategoryScore, CategoryStatus, ScoreCard,
};
pub use topic::{
    default_analysis_topics, default_scoring_categories, validate_weights, ScoringCategory, Topic,
};
