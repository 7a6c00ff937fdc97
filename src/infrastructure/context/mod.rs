//! Context store - per-entity semantic indexes and retrieval

mod retrieval_cache;
mod store;

pub use retrieval_cache::{RetrievalCache, RetrievedChunks};
pub use store::{ContextStore, ContextStoreConfig};
