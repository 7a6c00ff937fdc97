//! Document chunking

mod chunker;

pub use chunker::{Chunk, ChunkMetadata, ChunkingConfig, ChunkingStrategy};
