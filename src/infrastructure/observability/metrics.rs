//! Counters emitted through the `metrics` facade.
//!
//! Nothing here installs a recorder; without one every call is a no-op.

use metrics::counter;

use crate::domain::quota::QuotaKind;
use crate::domain::structured::ParseStage;

/// Outcome label of a whole evaluation or scoring run
pub fn record_run(kind: &'static str, outcome: &'static str) {
    counter!("evaluation_runs_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Outcome label of one fan-out unit
pub fn record_subtask(outcome: &'static str) {
    counter!("evaluation_subtasks_total", "outcome" => outcome).increment(1);
}

pub fn record_parse_degraded(stage: ParseStage) {
    counter!("structured_parse_degraded_total", "stage" => stage.as_str()).increment(1);
}

pub fn record_retrieval_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("retrieval_cache_total", "result" => result).increment(1);
}

pub fn record_search_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("search_cache_total", "result" => result).increment(1);
}

pub fn record_quota_denial(kind: QuotaKind) {
    counter!("quota_denials_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_gateway_retry(model: &str) {
    let labels = [("model", model.to_string())];
    counter!("gateway_retries_total", &labels).increment(1);
}
