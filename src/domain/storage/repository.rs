//! Storage trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

use super::entity::StorageEntity;

/// Durable keyed storage for one entity type
#[async_trait]
pub trait Storage<E>: Send + Sync + Debug
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError>;

    /// Insert or replace the entity stored under its key
    async fn put(&self, entity: &E) -> Result<(), DomainError>;

    /// Delete by key, returning whether anything was removed
    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError>;

    async fn list(&self) -> Result<Vec<E>, DomainError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::domain::storage::StorageKey;

    /// In-memory storage whose writes can be made to fail
    #[derive(Debug)]
    pub struct MockStorage<E>
    where
        E: StorageEntity,
    {
        entities: Mutex<HashMap<String, E>>,
        fail_writes: AtomicBool,
    }

    impl<E> Default for MockStorage<E>
    where
        E: StorageEntity,
    {
        fn default() -> Self {
            Self {
                entities: Mutex::new(HashMap::new()),
                fail_writes: AtomicBool::new(false),
            }
        }
    }

    impl<E> MockStorage<E>
    where
        E: StorageEntity,
    {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn check_writable(&self) -> Result<(), DomainError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DomainError::storage("disk full"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<E> Storage<E> for MockStorage<E>
    where
        E: StorageEntity + 'static,
    {
        async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
            Ok(self.entities.lock().unwrap().get(key.as_str()).cloned())
        }

        async fn put(&self, entity: &E) -> Result<(), DomainError> {
            self.check_writable()?;
            self.entities
                .lock()
                .unwrap()
                .insert(entity.key().as_str().to_string(), entity.clone());
            Ok(())
        }

        async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
            self.check_writable()?;
            Ok(self.entities.lock().unwrap().remove(key.as_str()).is_some())
        }

        async fn list(&self) -> Result<Vec<E>, DomainError> {
            Ok(self.entities.lock().unwrap().values().cloned().collect())
        }
    }
}
