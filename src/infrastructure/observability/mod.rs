//! Observability infrastructure - Metrics

mod metrics;

pub use metrics::{
    record_gateway_retry, record_parse_degraded, record_quota_denial, record_retrieval_cache,
    record_run, record_search_cache, record_subtask,
};
