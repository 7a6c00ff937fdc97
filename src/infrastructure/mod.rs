//! Infrastructure layer - External service implementations

pub mod cache;
pub mod context;
pub mod embedding;
pub mod gateway;
pub mod ingestion;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod quota;
pub mod search;
pub mod services;
pub mod storage;
pub mod sync;
pub mod validation;
