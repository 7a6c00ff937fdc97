mod recursive;

pub use recursive::RecursiveChunker;
