//! Query-result cache for entity retrieval

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use moka::future::Cache as MokaCache;

use crate::domain::context::{EntityId, RetrievalKey};
use crate::domain::DomainError;

/// Ordered chunk contents of one retrieval
pub type RetrievedChunks = Arc<Vec<String>>;

#[derive(Debug, Clone)]
struct Entry {
    generation: u64,
    chunks: RetrievedChunks,
}

/// Retrieval results keyed by (entity, normalized query, k).
///
/// There is no TTL; entries live until their entity is written to. Every entity carries
/// a generation number that [`invalidate_entity`](Self::invalidate_entity) bumps, and an
/// entry is only served while its generation is current. moka's predicate invalidation
/// then reclaims the memory in the background.
#[derive(Debug, Clone)]
pub struct RetrievalCache {
    cache: MokaCache<RetrievalKey, Entry>,
    generations: Arc<RwLock<HashMap<EntityId, u64>>>,
}

impl RetrievalCache {
    pub fn new(max_capacity: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .support_invalidation_closures()
            .build();

        Self {
            cache,
            generations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn generation(&self, entity_id: &EntityId) -> u64 {
        self.generations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn get(&self, key: &RetrievalKey) -> Option<RetrievedChunks> {
        let entry = self.cache.get(key).await?;
        (entry.generation == self.generation(&key.entity_id)).then_some(entry.chunks)
    }

    pub async fn insert(&self, key: RetrievalKey, chunks: RetrievedChunks) {
        let generation = self.generation(&key.entity_id);
        self.cache.insert(key, Entry { generation, chunks }).await;
    }

    pub fn invalidate_entity(&self, entity_id: &EntityId) -> Result<(), DomainError> {
        {
            let mut generations = self.generations.write().unwrap_or_else(|e| e.into_inner());
            *generations.entry(entity_id.clone()).or_insert(0) += 1;
        }

        let target = entity_id.clone();
        self.cache
            .invalidate_entries_if(move |key, _| key.entity_id == target)
            .map(|_| ())
            .map_err(|e| DomainError::cache(format!("Failed to invalidate retrievals: {}", e)))
    }
}
