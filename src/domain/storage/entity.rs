//! Storage entity traits

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

/// Trait for types that can be used as storage keys
pub trait StorageKey: Clone + Debug + Send + Sync + Eq + std::hash::Hash {
    /// The key as a string, used for file names and table keys
    fn as_str(&self) -> &str;
}

impl StorageKey for String {
    fn as_str(&self) -> &str {
        self
    }
}

/// Trait for types persisted through [`super::Storage`]
pub trait StorageEntity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    type Key: StorageKey;

    fn key(&self) -> &Self::Key;
}
