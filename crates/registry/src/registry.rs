//! The registry: named entries, session scoping, load-time reconciliation,
//! and the save traversals driven by the daemon.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::binding::{CodecOptions, FileBinding, FileBindery, SaveMode};
use crate::daemon::{DaemonState, SaveCallback, SaveDaemon};
use crate::errors::RegistryError;
use crate::storage::{DiskLog, DiskMap, DiskSet};
use crate::value::{scalars_from_json, DataValue, Scalar};

/// What a registered name resolves to.
#[derive(Clone)]
pub enum StoredEntry {
    /// Plain in-memory value shared behind a lock.
    Memory(Arc<RwLock<DataValue>>),
    SetCache(DiskSet),
    LogCache(DiskLog),
    MapCache(DiskMap),
}

impl StoredEntry {
    pub async fn len(&self) -> usize {
        match self {
            StoredEntry::Memory(value) => value.read().await.len(),
            StoredEntry::SetCache(set) => set.len().await,
            StoredEntry::LogCache(log) => log.len().await,
            StoredEntry::MapCache(map) => map.len().await,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// JSON snapshot for file saves: set and log containers serialize as
    /// ordered lists, map containers as plain objects.
    pub async fn to_json(&self) -> Value {
        match self {
            StoredEntry::Memory(value) => value.read().await.to_json(),
            StoredEntry::SetCache(set) => {
                Value::Array(set.snapshot().await.iter().map(Value::from).collect())
            }
            StoredEntry::LogCache(log) => {
                Value::Array(log.snapshot().await.iter().map(Value::from).collect())
            }
            StoredEntry::MapCache(map) => Value::Object(map.snapshot().await),
        }
    }

    pub fn as_memory(&self) -> Option<&Arc<RwLock<DataValue>>> {
        match self {
            StoredEntry::Memory(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_set_cache(&self) -> Option<&DiskSet> {
        match self {
            StoredEntry::SetCache(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_log_cache(&self) -> Option<&DiskLog> {
        match self {
            StoredEntry::LogCache(log) => Some(log),
            _ => None,
        }
    }

    pub fn as_map_cache(&self) -> Option<&DiskMap> {
        match self {
            StoredEntry::MapCache(map) => Some(map),
            _ => None,
        }
    }
}

/// Per-instance registration metadata. Deliberately owned by each registry,
/// never shared, so two registries over the same namespace cannot leak flags
/// into each other.
#[derive(Default)]
struct RegistryMeta {
    no_display: HashSet<String>,
    no_save: HashSet<String>,
    /// Suffixed composites whose entry was stored under the bare name.
    unsuffixed: HashSet<String>,
    save_opts: HashMap<String, CodecOptions>,
    load_opts: HashMap<String, CodecOptions>,
}

struct RegistryInner {
    session_id: String,
    cache_root: PathBuf,
    map_capacity: usize,
    bindery: Arc<dyn FileBinding>,
    entries: RwLock<HashMap<String, StoredEntry>>,
    meta: RwLock<RegistryMeta>,
    daemon: SaveDaemon,
}

/// Cheap-clone handle over the shared registry state.
#[derive(Clone)]
pub struct DataRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for DataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DataRegistry {
    pub fn new() -> Self {
        Self::with_config(&configs::AppConfig::default())
    }

    pub fn with_config(config: &configs::AppConfig) -> Self {
        Self::with_binding(config, Arc::new(FileBindery::new()))
    }

    /// Build over a custom file binding; used by tests to substitute doubles.
    pub fn with_binding(config: &configs::AppConfig, bindery: Arc<dyn FileBinding>) -> Self {
        let session_id = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        info!(%session_id, "registry created");
        Self {
            inner: Arc::new(RegistryInner {
                session_id,
                cache_root: PathBuf::from(&config.registry.cache_root),
                map_capacity: config.registry.map_capacity,
                bindery,
                entries: RwLock::new(HashMap::new()),
                meta: RwLock::new(RegistryMeta::default()),
                daemon: SaveDaemon::new(Duration::from_secs(config.daemon.save_interval_secs)),
            }),
        }
    }

    /// Random per-run suffix; never changes after construction.
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Strip this registry's session suffix from a stored key.
    fn logical_name<'a>(&self, key: &'a str) -> &'a str {
        key.strip_suffix(self.inner.session_id.as_str()).unwrap_or(key)
    }

    /// Validate the name, apply session suffixing, and record display
    /// bookkeeping. Returns the key the entry will be stored under.
    async fn admit(
        &self,
        name: &str,
        display: bool,
        append_session_id: bool,
    ) -> Result<String, RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::Validation(
                "entry name must not be empty".to_string(),
            ));
        }
        let key = if append_session_id {
            format!("{name}{}", self.inner.session_id)
        } else {
            name.to_string()
        };
        if self.inner.entries.read().await.contains_key(&key) {
            return Err(RegistryError::Validation(format!(
                "\"{key}\" is already registered"
            )));
        }
        let mut meta = self.inner.meta.write().await;
        if !append_session_id {
            meta.unsuffixed.insert(format!("{name}{}", self.inner.session_id));
        }
        if !display {
            meta.no_display.insert(key.clone());
        }
        Ok(key)
    }

    async fn record_options(
        &self,
        key: &str,
        save: bool,
        save_opts: Option<CodecOptions>,
        load_opts: Option<CodecOptions>,
    ) {
        let mut meta = self.inner.meta.write().await;
        if !save {
            meta.no_save.insert(key.to_string());
        }
        if let Some(opts) = save_opts {
            meta.save_opts.insert(key.to_string(), opts);
        }
        if let Some(opts) = load_opts {
            meta.load_opts.insert(key.to_string(), opts);
        }
    }

    /// Store an in-memory entry. With `append_session_id` the stored key is
    /// `name + session_id`; otherwise the bare name is kept and the suffixed
    /// composite is remembered so `get` can normalize it back.
    pub async fn register(
        &self,
        name: &str,
        value: DataValue,
        display: bool,
        append_session_id: bool,
    ) -> Result<(), RegistryError> {
        let key = self.admit(name, display, append_session_id).await?;
        self.inner
            .entries
            .write()
            .await
            .insert(key, StoredEntry::Memory(Arc::new(RwLock::new(value))));
        Ok(())
    }

    /// Register an in-memory entry reconciled with a file: when `load` is set
    /// and the file exists, its contents are numericized and merged into
    /// `initial` (set union, sequence append, loaded map keys win). A missing
    /// file is not an error; `initial` is stored unchanged.
    pub async fn register_file(
        &self,
        name: &str,
        mut initial: DataValue,
        path: impl AsRef<Path>,
        display: bool,
        load: bool,
        save: bool,
        save_opts: Option<CodecOptions>,
        load_opts: Option<CodecOptions>,
    ) -> Result<(), RegistryError> {
        // validate before touching metadata or the bindery, so a rejected
        // name leaves no trace behind
        let key = self.admit(name, display, false).await?;
        let path = path.as_ref();
        debug!(name = %key, path = %path.display(), "registering file entry");
        self.record_options(&key, save, save_opts, load_opts.clone())
            .await;
        self.inner.bindery.bind(&key, path).await;
        if load && self.inner.bindery.exists(&key).await {
            let opts = load_opts.unwrap_or_default();
            let loaded = self.inner.bindery.load(&key, &opts).await?;
            debug!(name = %key, "loaded prior state, reconciling");
            initial.reconcile(&loaded)?;
        }
        self.inner
            .entries
            .write()
            .await
            .insert(key, StoredEntry::Memory(Arc::new(RwLock::new(initial))));
        Ok(())
    }

    /// Register an entry whose storage is a disk-backed container instead of
    /// an in-memory value; `initial`'s shape picks the container kind and
    /// the backing directory is `<cache_root>/<directory>/<name>`. Loaded
    /// file data seeds the container directly; the container itself already
    /// persists across runs, so there is no reconciliation merge. With
    /// `path = None` the entry is cache-only and never flushed to a file.
    pub async fn register_cache(
        &self,
        name: &str,
        initial: DataValue,
        path: Option<&Path>,
        directory: &str,
        display: bool,
        load: bool,
        save: bool,
        save_opts: Option<CodecOptions>,
        load_opts: Option<CodecOptions>,
        append_session_id: bool,
    ) -> Result<(), RegistryError> {
        let key = self.admit(name, display, append_session_id).await?;
        debug!(name = %key, kind = initial.kind(), "registering cache entry");
        self.record_options(&key, save, save_opts, load_opts.clone())
            .await;
        let mut loaded = None;
        if let Some(path) = path {
            let logical = self.logical_name(&key).to_string();
            self.inner.bindery.bind(&logical, path).await;
            if load && self.inner.bindery.exists(&logical).await {
                let opts = load_opts.unwrap_or_default();
                loaded = Some(self.inner.bindery.load(&logical, &opts).await?);
                debug!(name = %key, "loaded prior state into cache seed");
            }
        }
        let entry = self.create_cache(&key, initial, loaded, directory).await?;
        self.inner.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn create_cache(
        &self,
        key: &str,
        initial: DataValue,
        loaded: Option<Value>,
        directory: &str,
    ) -> Result<StoredEntry, RegistryError> {
        // "jobs/seen" style names keep only the part after the slash on disk
        let path_name = key.rsplit('/').next().unwrap_or(key);
        let dir = self.inner.cache_root.join(directory).join(path_name);
        match initial {
            DataValue::Set(members) => {
                let seed: Vec<Scalar> = match &loaded {
                    Some(value) => scalars_from_json(value)?
                        .into_iter()
                        .map(Scalar::numericize)
                        .collect(),
                    None => members.into_iter().collect(),
                };
                debug!(key, dir = %dir.display(), "creating set container");
                Ok(StoredEntry::SetCache(DiskSet::new(dir, seed).await?))
            }
            DataValue::Seq(items) => {
                let seed = match &loaded {
                    Some(value) => scalars_from_json(value)?,
                    None => items,
                };
                debug!(key, dir = %dir.display(), "creating log container");
                Ok(StoredEntry::LogCache(DiskLog::new(dir, seed).await?))
            }
            DataValue::Map(map) => {
                let seed_map = match loaded {
                    Some(Value::Object(object)) => object,
                    Some(other) => {
                        return Err(RegistryError::Validation(format!(
                            "expected an object to seed \"{key}\", got {other}"
                        )))
                    }
                    None => map,
                };
                debug!(key, dir = %dir.display(), "creating map container");
                Ok(StoredEntry::MapCache(
                    DiskMap::new(dir, self.inner.map_capacity, seed_map.into_iter().collect())
                        .await?,
                ))
            }
        }
    }

    /// Suffix-normalized lookup. Entries registered without a session suffix
    /// are found under their bare name regardless of the current session id.
    pub async fn get(&self, name: &str) -> Option<StoredEntry> {
        let mut key = format!("{name}{}", self.inner.session_id);
        if self.inner.meta.read().await.unsuffixed.contains(&key) {
            key = name.to_string();
        }
        self.inner.entries.read().await.get(&key).cloned()
    }

    /// Write every bound, persist-enabled, non-empty entry through the file
    /// binding layer. A failing entry is logged and skipped; one corrupt or
    /// locked file never blocks saving the rest.
    pub async fn save(&self) {
        let entries = self.inner.entries.read().await.clone();
        for (key, entry) in &entries {
            if self.inner.meta.read().await.no_save.contains(key) {
                continue;
            }
            let logical = self.logical_name(key);
            if !self.inner.bindery.contains(logical).await {
                continue;
            }
            if entry.is_empty().await {
                continue;
            }
            let opts = self
                .inner
                .meta
                .read()
                .await
                .save_opts
                .get(key)
                .cloned()
                .unwrap_or_default();
            let snapshot = entry.to_json().await;
            if let Err(e) = self
                .inner
                .bindery
                .save(logical, &snapshot, &opts, SaveMode::Truncate)
                .await
            {
                error!(name = %key, error = %e, "failed to save entry");
            }
        }
    }

    /// Flush only the container entries: set/log containers as ordered list
    /// snapshots, map containers as plain objects, overwriting the bound file
    /// on each flush. Per-entry failures are logged and skipped.
    pub async fn save_caches(&self) {
        debug!("saving cache files");
        let entries = self.inner.entries.read().await.clone();
        for (key, entry) in &entries {
            if matches!(entry, StoredEntry::Memory(_)) {
                continue;
            }
            if self.inner.meta.read().await.no_save.contains(key) {
                continue;
            }
            let logical = self.logical_name(key);
            if !self.inner.bindery.contains(logical).await {
                continue;
            }
            let opts = self
                .inner
                .meta
                .read()
                .await
                .save_opts
                .get(key)
                .cloned()
                .unwrap_or_default();
            let snapshot = entry.to_json().await;
            if let Err(e) = self
                .inner
                .bindery
                .save(logical, &snapshot, &opts, SaveMode::Truncate)
                .await
            {
                error!(name = %key, error = %e, "failed to save cache entry");
            }
        }
    }

    /// Clear every container entry and delete its backing directory tree.
    /// Irreversible; intended only when the same data already has a durable
    /// file copy.
    pub async fn clean(&self) -> Result<(), RegistryError> {
        let entries = self.inner.entries.read().await.clone();
        for (key, entry) in &entries {
            let dir = match entry {
                StoredEntry::Memory(_) => continue,
                StoredEntry::SetCache(set) => {
                    set.clear().await?;
                    set.directory().to_path_buf()
                }
                StoredEntry::LogCache(log) => {
                    log.clear().await?;
                    log.directory().to_path_buf()
                }
                StoredEntry::MapCache(map) => {
                    map.clear().await?;
                    map.directory().to_path_buf()
                }
            };
            info!(name = %key, dir = %dir.display(), "removing cache directory");
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| RegistryError::io("removing cache directory", &dir, e))?;
        }
        Ok(())
    }

    /// Bordered totals block listing each displayable entry's element count;
    /// operator-facing only, never persisted.
    pub async fn summary(&self) -> String {
        let entries = self.inner.entries.read().await.clone();
        let meta = self.inner.meta.read().await;
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();

        let mut out = String::new();
        out.push_str(&format!("\n\t\t    <{}>\n", center("TOTALS", 55)));
        for key in keys {
            if meta.no_display.contains(key) {
                continue;
            }
            out.push_str(&format!("\t\t\t    {}: {}\n", key, entries[key].len().await));
        }
        out.push_str(&format!("\t\t    <{}>\n", center("END TOTALS", 55)));
        out.trim_end().to_string()
    }

    /// Wire `save` and `save_caches` as daemon callbacks and start the loop.
    /// The callbacks hold only weak references, so a dropped registry stops
    /// flushing instead of being kept alive by its own daemon.
    pub async fn start_save_daemon(
        &self,
        interval_override: Option<Duration>,
    ) -> Result<(), RegistryError> {
        if self.inner.daemon.state().await != DaemonState::Idle {
            return Err(RegistryError::Validation(
                "save daemon already started".to_string(),
            ));
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .daemon
            .add_callback(save_callback(weak.clone(), SaveKind::Files))
            .await;
        self.inner
            .daemon
            .add_callback(save_callback(weak, SaveKind::Caches))
            .await;
        self.inner.daemon.start(interval_override).await
    }

    /// Signal the daemon to stop; bounded by one interval, see `SaveDaemon`.
    pub fn stop_save_daemon(&self) {
        self.inner.daemon.stop();
    }

    pub fn daemon(&self) -> &SaveDaemon {
        &self.inner.daemon
    }
}

#[derive(Clone, Copy)]
enum SaveKind {
    Files,
    Caches,
}

fn save_callback(inner: Weak<RegistryInner>, kind: SaveKind) -> SaveCallback {
    Arc::new(move || {
        let inner = inner.clone();
        Box::pin(async move {
            if let Some(inner) = inner.upgrade() {
                let registry = DataRegistry { inner };
                match kind {
                    SaveKind::Files => registry.save().await,
                    SaveKind::Caches => registry.save_caches().await,
                }
            }
            Ok(())
        })
    })
}

fn center(text: &str, width: usize) -> String {
    if text.len() >= width {
        return text.to_string();
    }
    let pad = width - text.len();
    let left = pad / 2;
    format!("{}{}{}", "-".repeat(left), text, "-".repeat(pad - left))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pads_evenly() {
        assert_eq!(center("ab", 6), "--ab--");
        assert_eq!(center("abc", 6), "-abc--");
        assert_eq!(center("abcdefg", 3), "abcdefg");
    }

    #[tokio::test]
    async fn session_id_is_six_digits_and_stable() {
        let registry = DataRegistry::new();
        let id: u32 = registry.session_id().parse().expect("numeric");
        assert!((100_000..=999_999).contains(&id));
        assert_eq!(registry.session_id(), registry.clone().session_id());
    }

    #[tokio::test]
    async fn separate_registries_get_distinct_session_ids() {
        let first = DataRegistry::new();
        let mut second = DataRegistry::new();
        // one retry tolerates the 1-in-900k collision
        if first.session_id() == second.session_id() {
            second = DataRegistry::new();
        }
        assert_ne!(first.session_id(), second.session_id());
    }

    #[tokio::test]
    async fn register_rejects_empty_and_duplicate_names() {
        let registry = DataRegistry::new();
        assert!(registry
            .register("", DataValue::empty_set(), false, true)
            .await
            .is_err());
        registry
            .register("jobs", DataValue::empty_set(), false, true)
            .await
            .expect("first registration");
        let err = registry
            .register("jobs", DataValue::empty_set(), false, true)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn unsuffixed_entries_resolve_by_bare_name() {
        let registry = DataRegistry::new();
        registry
            .register("foo", DataValue::Seq(vec![Scalar::Int(9)]), true, false)
            .await
            .expect("register");
        let entry = registry.get("foo").await.expect("entry");
        assert_eq!(entry.len().await, 1);
    }

    #[tokio::test]
    async fn suffixed_entries_resolve_through_the_session_id() {
        let registry = DataRegistry::new();
        registry
            .register("bar", DataValue::empty_seq(), true, true)
            .await
            .expect("register");
        assert!(registry.get("bar").await.is_some());
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn summary_hides_undisplayed_entries() {
        let registry = DataRegistry::new();
        registry
            .register("shown", DataValue::Seq(vec![Scalar::Int(1)]), true, false)
            .await
            .expect("register");
        registry
            .register("hidden", DataValue::Seq(vec![Scalar::Int(1)]), false, false)
            .await
            .expect("register");
        let summary = registry.summary().await;
        assert!(summary.contains("shown: 1"));
        assert!(!summary.contains("hidden"));
        assert!(summary.contains("TOTALS"));
    }
}
