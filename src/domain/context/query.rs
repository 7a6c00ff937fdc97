//! Retrieval query keys

use super::entity::EntityId;

/// Trim, lowercase and collapse internal whitespace
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cache key for one retrieval: entity, normalized query text and k
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetrievalKey {
    pub entity_id: EntityId,
    pub query: String,
    pub k: usize,
}

impl RetrievalKey {
    pub fn new(entity_id: &EntityId, query: &str, k: usize) -> Self {
        Self {
            entity_id: entity_id.clone(),
            query: normalize_query(query),
            k,
        }
    }
}
