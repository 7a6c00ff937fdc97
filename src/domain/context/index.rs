//! Per-entity semantic index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityId;
use crate::domain::embedding::top_k_by_similarity;
use crate::domain::ingestion::ChunkMetadata;
use crate::domain::storage::StorageEntity;
use crate::domain::DomainError;

/// Caller-supplied description of an ingested document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
}

impl DocumentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }
}

/// A chunk with its embedding, owned by one document of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub position: ChunkMetadata,
    #[serde(default)]
    pub document: DocumentMetadata,
}

/// All chunks of one entity plus the embedding model that produced them.
///
/// Indexes only grow by appending whole documents; they are never rebuilt in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIndex {
    pub entity_id: EntityId,
    pub embedding_model: String,
    pub dimensions: Option<usize>,
    pub chunks: Vec<IndexedChunk>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityIndex {
    pub fn new(entity_id: EntityId, embedding_model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            embedding_model: embedding_model.into(),
            dimensions: None,
            chunks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document_count(&self) -> usize {
        let mut ids: Vec<&str> = self.chunks.iter().map(|c| c.document_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Append chunks, rejecting vectors whose dimensionality differs from the index
    pub fn append(&mut self, chunks: Vec<IndexedChunk>) -> Result<(), DomainError> {
        let mut dimensions = self.dimensions;

        for chunk in &chunks {
            match dimensions {
                Some(expected) if expected != chunk.embedding.len() => {
                    return Err(DomainError::indexing(format!(
                        "Embedding dimension mismatch for entity '{}': expected {}, got {}",
                        self.entity_id,
                        expected,
                        chunk.embedding.len()
                    )));
                }
                None => dimensions = Some(chunk.embedding.len()),
                _ => {}
            }
        }

        self.dimensions = dimensions;
        self.chunks.extend(chunks);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Up to `k` chunks ranked by descending cosine similarity to `query`
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<&IndexedChunk> {
        top_k_by_similarity(query, self.chunks.iter().map(|c| c.embedding.as_slice()), k)
            .into_iter()
            .map(|(idx, _)| &self.chunks[idx])
            .collect()
    }
}

impl StorageEntity for EntityIndex {
    type Key = EntityId;

    fn key(&self) -> &Self::Key {
        &self.entity_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: &str, content: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: format!("{}-{}", doc, content),
            document_id: doc.to_string(),
            content: content.to_string(),
            embedding,
            position: ChunkMetadata::new(0, 1, 0, content.len()),
            document: DocumentMetadata::new(),
        }
    }

    #[test]
    fn test_append_and_nearest() {
        let mut index = EntityIndex::new(EntityId::new("acme").unwrap(), "hashing");
        index
            .append(vec![
                chunk("d1", "team", vec![1.0, 0.0]),
                chunk("d1", "market", vec![0.0, 1.0]),
                chunk("d2", "mixed", vec![0.6, 0.8]),
            ])
            .unwrap();

        assert_eq!(index.chunk_count(), 3);
        assert_eq!(index.document_count(), 2);
        assert_eq!(index.dimensions, Some(2));

        let nearest: Vec<&str> = index
            .nearest(&[0.0, 1.0], 2)
            .into_iter()
            .map(|c| c.content.as_str())
            .collect();
        assert_eq!(nearest, vec!["market", "mixed"]);
    }

    #[test]
    fn test_append_rejects_dimension_mismatch_atomically() {
        let mut index = EntityIndex::new(EntityId::new("acme").unwrap(), "hashing");
        index.append(vec![chunk("d1", "a", vec![1.0, 0.0])]).unwrap();

        let result = index.append(vec![
            chunk("d2", "b", vec![1.0, 0.0]),
            chunk("d2", "c", vec![1.0, 0.0, 0.0]),
        ]);

        assert!(matches!(result, Err(DomainError::Indexing { .. })));
        assert_eq!(index.chunk_count(), 1);
    }

    #[test]
    fn test_nearest_on_empty_index() {
        let index = EntityIndex::new(EntityId::new("empty").unwrap(), "hashing");
        assert!(index.nearest(&[1.0], 5).is_empty());
    }
}
