//! Entities, their semantic indexes and retrieval keys

mod entity;
mod index;
mod query;

pub use entity::{EntityId, EntityProfile};
pub use index::{DocumentMetadata, EntityIndex, IndexedChunk};
pub use query::{normalize_query, RetrievalKey};
