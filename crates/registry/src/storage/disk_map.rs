use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::{fs, sync::RwLock};
use tracing::debug;

use crate::errors::RegistryError;
use crate::storage::DATA_FILE;

/// Key-value container with a hard capacity. Inserting a new key at capacity
/// evicts the least-recently-used key first; `get` counts as use. Recency
/// order is part of the on-disk snapshot (least recent first), so eviction
/// behaves the same after a reload.
#[derive(Clone, Debug)]
pub struct DiskMap {
    // front = least recently used, back = most recently used
    inner: Arc<RwLock<Vec<(String, Value)>>>,
    capacity: usize,
    dir: PathBuf,
    file: PathBuf,
}

impl DiskMap {
    /// Open or create the map at `dir`, folding `seed` into whatever the
    /// directory already holds. Seed pairs count as fresh use and are
    /// evicted-through if they overflow `capacity`.
    pub async fn new(
        dir: impl Into<PathBuf>,
        capacity: usize,
        seed: Vec<(String, Value)>,
    ) -> Result<Self, RegistryError> {
        if capacity == 0 {
            return Err(RegistryError::Validation(
                "map container capacity must be at least 1".to_string(),
            ));
        }
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RegistryError::io("creating container directory", &dir, e))?;
        let file = dir.join(DATA_FILE);
        let mut entries: Vec<(String, Value)> = match fs::read(&file).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RegistryError::codec("decoding map snapshot", e))?,
            Err(_) => Vec::new(),
        };
        for (key, value) in seed {
            if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
                entries.remove(pos);
            }
            entries.push((key, value));
        }
        while entries.len() > capacity {
            entries.remove(0);
        }
        debug!(dir = %dir.display(), entries = entries.len(), capacity, "opened map container");
        let map = Self {
            inner: Arc::new(RwLock::new(entries)),
            capacity,
            dir,
            file,
        };
        map.persist().await?;
        Ok(map)
    }

    async fn persist(&self) -> Result<(), RegistryError> {
        let entries = self.inner.read().await.clone();
        let bytes = serde_json::to_vec(&entries)
            .map_err(|e| RegistryError::codec("encoding map snapshot", e))?;
        fs::write(&self.file, bytes)
            .await
            .map_err(|e| RegistryError::io("writing map snapshot", &self.file, e))
    }

    /// Insert or update a key, making it the most recently used. Returns the
    /// entry evicted to stay within capacity, if any.
    pub async fn put(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<(String, Value)>, RegistryError> {
        let key = key.into();
        let evicted = {
            let mut entries = self.inner.write().await;
            if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
                entries.remove(pos);
            }
            let evicted = if entries.len() >= self.capacity {
                Some(entries.remove(0))
            } else {
                None
            };
            entries.push((key, value));
            evicted
        };
        if let Some((evicted_key, _)) = &evicted {
            debug!(key = %evicted_key, "evicted least-recently-used entry");
        }
        self.persist().await?;
        Ok(evicted)
    }

    /// Fetch a value; a hit refreshes the key's recency.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, RegistryError> {
        let hit = {
            let mut entries = self.inner.write().await;
            match entries.iter().position(|(k, _)| k == key) {
                Some(pos) => {
                    let entry = entries.remove(pos);
                    let value = entry.1.clone();
                    entries.push(entry);
                    Some(value)
                }
                None => None,
            }
        };
        if hit.is_some() {
            self.persist().await?;
        }
        Ok(hit)
    }

    /// Remove a key; returns its value if it existed.
    pub async fn remove(&self, key: &str) -> Result<Option<Value>, RegistryError> {
        let removed = {
            let mut entries = self.inner.write().await;
            entries
                .iter()
                .position(|(k, _)| k == key)
                .map(|pos| entries.remove(pos).1)
        };
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.iter().any(|(k, _)| k == key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Empty the map and rewrite the empty snapshot.
    pub async fn clear(&self) -> Result<(), RegistryError> {
        self.inner.write().await.clear();
        self.persist().await
    }

    /// Plain object snapshot used by file saves; recency is not part of it.
    pub async fn snapshot(&self) -> Map<String, Value> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }
}
