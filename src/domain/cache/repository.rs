//! TTL cache trait

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::DomainError;

/// Key-value cache with per-entry TTL.
///
/// Values travel as JSON strings to keep the trait dyn-compatible; [`CacheExt`]
/// provides the typed helpers.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    async fn clear(&self) -> Result<(), DomainError>;

    /// Approximate number of live entries
    async fn size(&self) -> Result<usize, DomainError>;
}

/// Typed get/set on top of [`Cache`]
pub trait CacheExt: Cache {
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(data) => {
                    let value: V = serde_json::from_str(&data).map_err(|e| {
                        DomainError::cache(format!("Failed to deserialize cache value: {}", e))
                    })?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }

    fn set<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::cache(format!("Failed to serialize cache value: {}", e))
            })?;
            self.set_raw(key, &data, ttl).await
        }
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}
