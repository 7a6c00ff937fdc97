//! Per-entity semantic index with an invalidating query cache

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::retrieval_cache::RetrievalCache;
use crate::domain::context::{DocumentMetadata, EntityId, EntityIndex, IndexedChunk, RetrievalKey};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::ingestion::{ChunkingConfig, ChunkingStrategy};
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::observability::record_retrieval_cache;
use crate::infrastructure::sync::KeyedLocks;

/// Retrieval tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextStoreConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    /// Texts per embedding request during ingestion
    pub embed_batch_size: usize,
    pub cache_capacity: u64,
}

impl Default for ContextStoreConfig {
    fn default() -> Self {
        let chunking = ChunkingConfig::default();
        Self {
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            min_chunk_size: chunking.min_chunk_size,
            embed_batch_size: 64,
            cache_capacity: 10_000,
        }
    }
}

impl ContextStoreConfig {
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
            .with_min_chunk_size(self.min_chunk_size)
    }
}

/// Chunks, embeds and indexes entity documents and answers top-k queries.
///
/// Each entity's index is replaced copy-on-write: a writer builds the grown index,
/// persists it, swaps it in and invalidates that entity's cached queries, all under the
/// entity's lock. Cache-miss readers take the same lock, so a stale result can never be
/// cached after a write has committed.
#[derive(Debug)]
pub struct ContextStore {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn ChunkingStrategy>,
    storage: Arc<dyn Storage<EntityIndex>>,
    resident: RwLock<HashMap<EntityId, Arc<EntityIndex>>>,
    cache: RetrievalCache,
    locks: KeyedLocks,
    config: ContextStoreConfig,
}

impl ContextStore {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Arc<dyn ChunkingStrategy>,
        storage: Arc<dyn Storage<EntityIndex>>,
        config: ContextStoreConfig,
    ) -> Result<Self, DomainError> {
        config.chunking().validate()?;
        if config.embed_batch_size == 0 {
            return Err(DomainError::configuration("embed_batch_size must be greater than 0"));
        }

        Ok(Self {
            embedder,
            chunker,
            storage,
            resident: RwLock::new(HashMap::new()),
            cache: RetrievalCache::new(config.cache_capacity),
            locks: KeyedLocks::new(),
            config,
        })
    }

    /// Chunk, embed and append one document. Returns the number of chunks indexed.
    ///
    /// All chunks of the call are committed or none are; on failure the previous index
    /// stays in place.
    pub async fn add_document(
        &self,
        entity_id: &EntityId,
        text: &str,
        metadata: DocumentMetadata,
    ) -> Result<usize, DomainError> {
        let chunks = self
            .chunker
            .chunk(text, &self.config.chunking())
            .map_err(|e| DomainError::indexing(format!("Chunking failed: {}", e)))?;

        if chunks.is_empty() {
            debug!(entity_id = %entity_id, "Document produced no chunks");
            return Ok(0);
        }

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embed_batched(&contents).await?;

        let document_id = Uuid::new_v4().to_string();
        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk {
                id: format!("{}-{}", document_id, chunk.index()),
                document_id: document_id.clone(),
                content: chunk.content,
                embedding,
                position: chunk.metadata,
                document: metadata.clone(),
            })
            .collect();
        let count = indexed.len();

        let _guard = self.locks.lock(entity_id.as_str()).await;

        let current = self.load_index(entity_id).await?;
        let mut next = match current {
            Some(index) => {
                if index.chunk_count() > 0 && index.embedding_model != self.embedder.model() {
                    return Err(DomainError::indexing(format!(
                        "Entity '{}' was indexed with '{}', not '{}'",
                        entity_id,
                        index.embedding_model,
                        self.embedder.model()
                    )));
                }
                index.as_ref().clone()
            }
            None => EntityIndex::new(entity_id.clone(), self.embedder.model()),
        };

        next.append(indexed)?;

        self.storage
            .put(&next)
            .await
            .map_err(|e| DomainError::indexing(format!("Failed to persist index: {}", e)))?;

        let total = next.chunk_count();
        self.resident_write().insert(entity_id.clone(), Arc::new(next));
        self.cache.invalidate_entity(entity_id)?;

        info!(
            entity_id = %entity_id,
            document_id = %document_id,
            chunks = count,
            total_chunks = total,
            "Indexed document"
        );

        Ok(count)
    }

    /// Up to `k` chunk contents ranked by descending similarity to `query`.
    ///
    /// An entity without an index yields an empty list, which is not cached.
    pub async fn query(
        &self,
        entity_id: &EntityId,
        query: &str,
        k: usize,
    ) -> Result<Arc<Vec<String>>, DomainError> {
        if k == 0 {
            return Ok(Arc::new(Vec::new()));
        }

        let key = RetrievalKey::new(entity_id, query, k);

        if let Some(hit) = self.cache.get(&key).await {
            record_retrieval_cache(true);
            debug!(entity_id = %entity_id, query = %key.query, k, "Retrieval cache hit");
            return Ok(hit);
        }

        let _guard = self.locks.lock(entity_id.as_str()).await;

        if let Some(hit) = self.cache.get(&key).await {
            record_retrieval_cache(true);
            return Ok(hit);
        }
        record_retrieval_cache(false);

        let Some(index) = self.load_index(entity_id).await? else {
            debug!(entity_id = %entity_id, "No index for entity");
            return Ok(Arc::new(Vec::new()));
        };

        if index.embedding_model != self.embedder.model() {
            warn!(
                entity_id = %entity_id,
                index_model = %index.embedding_model,
                embedder_model = %self.embedder.model(),
                "Index was built with a different embedding model"
            );
        }

        let query_vector = self.embedder.embed_one(&key.query).await?;
        let results: Vec<String> = index
            .nearest(&query_vector, k)
            .into_iter()
            .map(|chunk| chunk.content.clone())
            .collect();
        let results = Arc::new(results);

        self.cache.insert(key, results.clone()).await;
        Ok(results)
    }

    /// Drop the index and every cached query of the entity. Returns whether an index existed.
    pub async fn delete_entity(&self, entity_id: &EntityId) -> Result<bool, DomainError> {
        let _guard = self.locks.lock(entity_id.as_str()).await;

        let persisted = self.storage.delete(entity_id).await?;
        let resident = self.resident_write().remove(entity_id).is_some();
        self.cache.invalidate_entity(entity_id)?;

        info!(entity_id = %entity_id, "Deleted entity index");
        Ok(persisted || resident)
    }

    /// Forget cached queries without touching the index
    pub async fn invalidate(&self, entity_id: &EntityId) -> Result<(), DomainError> {
        let _guard = self.locks.lock(entity_id.as_str()).await;
        self.cache.invalidate_entity(entity_id)
    }

    pub async fn chunk_count(&self, entity_id: &EntityId) -> Result<usize, DomainError> {
        Ok(self
            .load_index(entity_id)
            .await?
            .map(|index| index.chunk_count())
            .unwrap_or(0))
    }

    async fn embed_batched(&self, contents: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let mut embeddings = Vec::with_capacity(contents.len());

        for batch in contents.chunks(self.config.embed_batch_size) {
            let vectors = self
                .embedder
                .embed(batch)
                .await
                .map_err(|e| DomainError::indexing(format!("Embedding failed: {}", e)))?;

            if vectors.len() != batch.len() {
                return Err(DomainError::indexing(format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    /// Resident index, lazily loaded from storage
    async fn load_index(&self, entity_id: &EntityId) -> Result<Option<Arc<EntityIndex>>, DomainError> {
        if let Some(index) = self.resident_read().get(entity_id) {
            return Ok(Some(index.clone()));
        }

        let Some(index) = self.storage.get(entity_id).await? else {
            return Ok(None);
        };

        let index = Arc::new(index);
        debug!(entity_id = %entity_id, chunks = index.chunk_count(), "Loaded index from storage");
        self.resident_write()
            .entry(entity_id.clone())
            .or_insert_with(|| index.clone());
        Ok(Some(index))
    }

    fn resident_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<EntityId, Arc<EntityIndex>>> {
        self.resident.read().unwrap_or_else(|e| e.into_inner())
    }

    fn resident_write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityId, Arc<EntityIndex>>> {
        self.resident.write().unwrap_or_else(|e| e.into_inner())
    }
}
