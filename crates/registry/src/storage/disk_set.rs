use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::{fs, sync::RwLock};
use tracing::debug;

use crate::errors::RegistryError;
use crate::storage::DATA_FILE;
use crate::value::Scalar;

/// Set of unique scalars whose contents are rewritten to disk on every
/// mutation. Cheap to clone; clones share the same backing state.
#[derive(Clone)]
pub struct DiskSet {
    inner: Arc<RwLock<HashSet<Scalar>>>,
    dir: PathBuf,
    file: PathBuf,
}

impl DiskSet {
    /// Open or create the set at `dir`, folding `seed` into whatever the
    /// directory already holds.
    pub async fn new(dir: impl Into<PathBuf>, seed: Vec<Scalar>) -> Result<Self, RegistryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RegistryError::io("creating container directory", &dir, e))?;
        let file = dir.join(DATA_FILE);
        let mut members: HashSet<Scalar> = match fs::read(&file).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RegistryError::codec("decoding set snapshot", e))?,
            Err(_) => HashSet::new(),
        };
        members.extend(seed);
        debug!(dir = %dir.display(), members = members.len(), "opened set container");
        let set = Self {
            inner: Arc::new(RwLock::new(members)),
            dir,
            file,
        };
        set.persist().await?;
        Ok(set)
    }

    async fn persist(&self) -> Result<(), RegistryError> {
        let snapshot = self.snapshot().await;
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| RegistryError::codec("encoding set snapshot", e))?;
        fs::write(&self.file, bytes)
            .await
            .map_err(|e| RegistryError::io("writing set snapshot", &self.file, e))
    }

    /// Insert a member; returns whether it was newly added.
    pub async fn insert(&self, member: impl Into<Scalar>) -> Result<bool, RegistryError> {
        let added = self.inner.write().await.insert(member.into());
        if added {
            self.persist().await?;
        }
        Ok(added)
    }

    pub async fn extend(&self, members: Vec<Scalar>) -> Result<(), RegistryError> {
        self.inner.write().await.extend(members);
        self.persist().await
    }

    /// Remove a member; returns whether it existed.
    pub async fn remove(&self, member: &Scalar) -> Result<bool, RegistryError> {
        let existed = self.inner.write().await.remove(member);
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    pub async fn contains(&self, member: &Scalar) -> bool {
        self.inner.read().await.contains(member)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Empty the set and rewrite the empty snapshot.
    pub async fn clear(&self) -> Result<(), RegistryError> {
        self.inner.write().await.clear();
        self.persist().await
    }

    /// Sorted copy of the members; used for stable file snapshots.
    pub async fn snapshot(&self) -> Vec<Scalar> {
        let mut members: Vec<Scalar> = self.inner.read().await.iter().cloned().collect();
        members.sort();
        members
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("disk_set_{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn inserts_survive_a_reload() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let set = DiskSet::new(&dir, vec![Scalar::Int(1)]).await?;
        assert!(set.insert(2).await?);
        assert!(set.insert("three").await?);
        assert!(!set.insert(2).await?);
        assert_eq!(set.len().await, 3);

        let reloaded = DiskSet::new(&dir, Vec::new()).await?;
        assert_eq!(reloaded.snapshot().await, set.snapshot().await);

        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn clear_empties_contents_and_snapshot() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let set = DiskSet::new(&dir, vec![Scalar::Int(1), Scalar::Int(2)]).await?;
        set.clear().await?;
        assert!(set.is_empty().await);

        let reloaded = DiskSet::new(&dir, Vec::new()).await?;
        assert!(reloaded.is_empty().await);

        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn remove_persists() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let set = DiskSet::new(&dir, vec![Scalar::Int(1), Scalar::Int(2)]).await?;
        assert!(set.remove(&Scalar::Int(1)).await?);
        assert!(!set.remove(&Scalar::Int(1)).await?);

        let reloaded = DiskSet::new(&dir, Vec::new()).await?;
        assert_eq!(reloaded.snapshot().await, vec![Scalar::Int(2)]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }
}
