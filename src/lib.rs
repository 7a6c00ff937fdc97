//! PMP Evaluation Engine
//!
//! Retrieval-augmented evaluation of business documents:
//! - Per-entity semantic indexes with an invalidating query cache
//! - Concurrent per-topic analysis and weighted scoring with partial-failure tolerance
//! - Staged extraction of structured records from free-form model output
//! - Cached web-search evidence
//! - Tiered daily, weekly, monthly and per-evaluation usage quotas

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod infrastructure;

pub use config::AppConfig;
pub use engine::{EngineBuilder, EvaluationEngine};
