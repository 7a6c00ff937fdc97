//! External validation: planned web searches behind a TTL cache

mod evidence;
mod founders;
mod planner;

pub use evidence::{search_cache_key, EvidenceCache, EvidenceConfig, QueryEvidence};
pub use founders::FounderExtractor;
pub use planner::EvidenceQueryPlanner;
