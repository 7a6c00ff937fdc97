//! Storage backend selection

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::DomainError;

use super::file::FileStorage;
use super::in_memory::InMemoryStorage;
use super::postgres::{PostgresConfig, PostgresStorage};

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    Memory,
    /// One JSON file per record
    #[default]
    File,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::Memory),
            "file" | "files" | "json" => Some(Self::File),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Root directory for the file backend
    pub data_dir: PathBuf,
    pub postgres: PostgresConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::File,
            data_dir: PathBuf::from("./data"),
            postgres: PostgresConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            storage_type: StorageType::Memory,
            ..Default::default()
        }
    }

    pub fn file(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_type: StorageType::File,
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
enum Backend {
    Memory,
    File(PathBuf),
    Postgres(PgPool),
}

/// Creates typed storages that share one backend (and one pool for Postgres)
#[derive(Debug, Clone)]
pub struct StorageFactory {
    backend: Backend,
}

impl StorageFactory {
    pub async fn connect(config: &StorageConfig) -> Result<Self, DomainError> {
        let backend = match config.storage_type {
            StorageType::Memory => Backend::Memory,
            StorageType::File => Backend::File(config.data_dir.clone()),
            StorageType::Postgres => Backend::Postgres(config.postgres.connect().await?),
        };

        info!(storage_type = ?config.storage_type, "Storage backend ready");
        Ok(Self { backend })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
        }
    }

    /// Storage for one entity type; `name` is the sub-directory or table suffix
    pub async fn create<E>(&self, name: &str) -> Result<Arc<dyn Storage<E>>, DomainError>
    where
        E: StorageEntity + 'static,
    {
        match &self.backend {
            Backend::Memory => Ok(Arc::new(InMemoryStorage::<E>::new())),
            Backend::File(dir) => Ok(Arc::new(FileStorage::<E>::open(dir.join(name)).await?)),
            Backend::Postgres(pool) => {
                let storage = PostgresStorage::<E>::new(pool.clone(), format!("eval_{}", name));
                storage.ensure_table().await?;
                Ok(Arc::new(storage))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{EntityId, EntityProfile};

    #[test]
    fn test_storage_type_parse() {
        assert_eq!(StorageType::parse("memory"), Some(StorageType::Memory));
        assert_eq!(StorageType::parse("in-memory"), Some(StorageType::Memory));
        assert_eq!(StorageType::parse("file"), Some(StorageType::File));
        assert_eq!(StorageType::parse("postgresql"), Some(StorageType::Postgres));
        assert_eq!(StorageType::parse("pg"), Some(StorageType::Postgres));
        assert_eq!(StorageType::parse("unknown"), None);
    }

    #[test]
    fn test_config_deserializes_type_field() {
        let config: StorageConfig =
            serde_json::from_value(serde_json::json!({"type": "memory"})).unwrap();
        assert_eq!(config.storage_type, StorageType::Memory);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }

    #[tokio::test]
    async fn test_file_backend_uses_sub_directories() {
        let dir = tempfile::tempdir().unwrap();
        let factory = StorageFactory::connect(&StorageConfig::file(dir.path()))
            .await
            .unwrap();

        let profiles = factory.create::<EntityProfile>("profiles").await.unwrap();
        profiles
            .put(&EntityProfile::new(EntityId::new("acme").unwrap(), "Acme"))
            .await
            .unwrap();

        assert!(dir.path().join("profiles").join("acme.json").exists());
    }
}
