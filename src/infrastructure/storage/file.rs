//! JSON-file storage: one document per key under a directory

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Stores each entity as `<dir>/<key>.json`.
///
/// Writes go to a sibling temp file that is renamed into place, so a crash never leaves
/// a half-written document behind. Keys outside `[A-Za-z0-9_-]` are hex-encoded.
#[derive(Debug)]
pub struct FileStorage<E>
where
    E: StorageEntity,
{
    dir: PathBuf,
    _phantom: PhantomData<E>,
}

impl<E> FileStorage<E>
where
    E: StorageEntity,
{
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            DomainError::storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        Ok(Self {
            dir,
            _phantom: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        let stem = if safe {
            key.to_string()
        } else {
            format!("x-{}", hex::encode(key.as_bytes()))
        };

        self.dir.join(format!("{}.json", stem))
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), DomainError> {
    let temp_path = path.with_extension("json.tmp");

    fs::write(&temp_path, content)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to write temp file: {}", e)))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to rename temp file: {}", e)))
}

async fn read_entity<E: StorageEntity>(path: &Path) -> Result<Option<E>, DomainError> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            DomainError::storage(format!("Failed to deserialize {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::storage(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl<E> Storage<E> for FileStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        read_entity(&self.path_for(key.as_str())).await
    }

    async fn put(&self, entity: &E) -> Result<(), DomainError> {
        let data = serde_json::to_vec(entity)
            .map_err(|e| DomainError::storage(format!("Failed to serialize entity: {}", e)))?;

        let path = self.path_for(entity.key().as_str());
        write_atomic(&path, &data).await?;
        debug!(path = %path.display(), bytes = data.len(), "Stored entity");
        Ok(())
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        match fs::remove_file(self.path_for(key.as_str())).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DomainError::storage(format!("Failed to delete entity: {}", e))),
        }
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list directory: {}", e)))?;

        let mut entities = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list directory: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(entity) = read_entity(&path).await? {
                entities.push(entity);
            }
        }

        Ok(entities)
    }
}
