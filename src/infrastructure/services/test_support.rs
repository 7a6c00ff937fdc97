//! Fixtures shared by the service tests

use std::sync::Arc;

use crate::domain::context::{DocumentMetadata, EntityId, EntityIndex, EntityProfile};
use crate::domain::embedding::MockEmbeddingProvider;
use crate::domain::llm::{MockLlmProvider, ModelGateway};
use crate::domain::storage::MockStorage;
use crate::infrastructure::context::{ContextStore, ContextStoreConfig};
use crate::infrastructure::gateway::{GatewayConfig, RateLimitedGateway, RetryPolicy};
use crate::infrastructure::ingestion::RecursiveChunker;

pub const PITCH: &str = "Acme builds routing software for regional freight carriers.\n\n\
    The founding team previously scaled logistics operations at two carriers and has \
    twenty years of combined experience.\n\n\
    Revenue reached 1.2 million dollars last year with forty paying customers and \
    monthly growth of eight percent.";

pub fn acme() -> EntityProfile {
    EntityProfile::new(EntityId::new("acme").unwrap(), "Acme Routing").with_industry("logistics")
}

/// Gateway over `provider` without pacing or retries
pub fn gateway(provider: MockLlmProvider) -> (Arc<dyn ModelGateway>, Arc<MockLlmProvider>) {
    let provider = Arc::new(provider);
    let config = GatewayConfig::default()
        .with_min_interval(0)
        .with_retry(RetryPolicy::new(0));
    let gateway = RateLimitedGateway::new(provider.clone(), config).unwrap();
    (Arc::new(gateway), provider)
}

pub fn context_store() -> Arc<ContextStore> {
    let config = ContextStoreConfig {
        chunk_size: 160,
        chunk_overlap: 20,
        ..Default::default()
    };
    Arc::new(
        ContextStore::new(
            Arc::new(MockEmbeddingProvider::new(128)),
            Arc::new(RecursiveChunker::new()),
            Arc::new(MockStorage::<EntityIndex>::new()),
            config,
        )
        .unwrap(),
    )
}

/// Context store already holding the pitch for `acme`
pub async fn indexed_store() -> Arc<ContextStore> {
    let store = context_store();
    store
        .add_document(&acme().id, PITCH, DocumentMetadata::new().with_source_id("deck"))
        .await
        .unwrap();
    store
}
