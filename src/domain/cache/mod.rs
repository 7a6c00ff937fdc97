//! Cache abstraction

mod repository;

pub use repository::{Cache, CacheExt};
