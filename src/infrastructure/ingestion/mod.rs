//! Chunking implementations

mod chunkers;

pub use chunkers::RecursiveChunker;
