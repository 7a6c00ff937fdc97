//! Storage infrastructure - Storage implementations

mod factory;
mod file;
mod in_memory;
mod postgres;

pub use factory::{StorageConfig, StorageFactory, StorageType};
pub use file::FileStorage;
pub use in_memory::InMemoryStorage;
pub use postgres::{PostgresConfig, PostgresStorage};
