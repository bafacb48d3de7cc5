use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::{fs, sync::RwLock};
use tracing::debug;

use crate::errors::RegistryError;
use crate::storage::DATA_FILE;
use crate::value::Scalar;

/// Append-ordered sequence of scalars, duplicates allowed, rewritten to disk
/// on every mutation.
#[derive(Clone)]
pub struct DiskLog {
    inner: Arc<RwLock<Vec<Scalar>>>,
    dir: PathBuf,
    file: PathBuf,
}

impl DiskLog {
    /// Open or create the log at `dir`, appending `seed` after whatever the
    /// directory already holds.
    pub async fn new(dir: impl Into<PathBuf>, seed: Vec<Scalar>) -> Result<Self, RegistryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RegistryError::io("creating container directory", &dir, e))?;
        let file = dir.join(DATA_FILE);
        let mut items: Vec<Scalar> = match fs::read(&file).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RegistryError::codec("decoding log snapshot", e))?,
            Err(_) => Vec::new(),
        };
        items.extend(seed);
        debug!(dir = %dir.display(), items = items.len(), "opened log container");
        let log = Self {
            inner: Arc::new(RwLock::new(items)),
            dir,
            file,
        };
        log.persist().await?;
        Ok(log)
    }

    async fn persist(&self) -> Result<(), RegistryError> {
        let snapshot = self.snapshot().await;
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| RegistryError::codec("encoding log snapshot", e))?;
        fs::write(&self.file, bytes)
            .await
            .map_err(|e| RegistryError::io("writing log snapshot", &self.file, e))
    }

    pub async fn push(&self, item: impl Into<Scalar>) -> Result<(), RegistryError> {
        self.inner.write().await.push(item.into());
        self.persist().await
    }

    pub async fn extend(&self, items: Vec<Scalar>) -> Result<(), RegistryError> {
        self.inner.write().await.extend(items);
        self.persist().await
    }

    pub async fn contains(&self, item: &Scalar) -> bool {
        self.inner.read().await.contains(item)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Empty the log and rewrite the empty snapshot.
    pub async fn clear(&self) -> Result<(), RegistryError> {
        self.inner.write().await.clear();
        self.persist().await
    }

    /// Copy of the items in append order.
    pub async fn snapshot(&self) -> Vec<Scalar> {
        self.inner.read().await.clone()
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }
}
