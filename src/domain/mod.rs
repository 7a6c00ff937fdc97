//! Domain layer - Core business logic and entities

pub mod cache;
pub mod context;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod ingestion;
pub mod llm;
pub mod quota;
pub mod search;
pub mod storage;
pub mod structured;
pub mod text;

pub use cache::{Cache, CacheExt};
pub use context::{DocumentMetadata, EntityId, EntityIndex, EntityProfile, IndexedChunk, RetrievalKey};
pub use embedding::EmbeddingProvider;
pub use error::DomainError;
pub use evaluation::{
    CancellationFlag, ConsolidatedResult, EvaluationError, RunState, ScoreCard, SubTaskOutcome,
};
pub use ingestion::{Chunk, ChunkMetadata, ChunkingConfig, ChunkingStrategy};
pub use llm::{
    FinishReason, GenerationOptions, LlmProvider, LlmRequest, LlmResponse, Message, MessageRole,
    ModelGateway, Usage,
};
pub use quota::{QuotaExceeded, QuotaKind, Resource, SubscriptionTier, TierTable, UsageWindows};
pub use search::{SearchHit, SearchProvider};
pub use storage::{Storage, StorageEntity, StorageKey};
pub use structured::{ParseOutcome, ParseStage, RecordSchema, StructuredParser, StructuredRecord};
