//! Format-aware file binding layer.
//!
//! Maps a logical entry name to a path on disk and performs load/save in the
//! format implied by the file extension. The registry talks to this through
//! the [`FileBinding`] trait so tests can substitute failing or in-memory
//! implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::RegistryError;
use crate::value::scalars_from_json;

/// How a save opens the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Replace the file contents.
    Truncate,
    /// Append to the file; only meaningful for the line format.
    Append,
}

/// Per-name codec options recorded at registration time.
#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    /// Pretty-print JSON output.
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Lines,
}

impl FileFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") | Some("list") | Some("lines") => FileFormat::Lines,
            _ => FileFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    path: PathBuf,
    format: FileFormat,
}

/// Seam between the registry and the filesystem.
#[async_trait]
pub trait FileBinding: Send + Sync {
    /// Record a logical name -> path mapping.
    async fn bind(&self, name: &str, path: &Path);
    /// Whether the name has a binding at all.
    async fn contains(&self, name: &str) -> bool;
    /// Whether the bound file currently exists on disk.
    async fn exists(&self, name: &str) -> bool;
    async fn load(&self, name: &str, opts: &CodecOptions) -> Result<Value, RegistryError>;
    async fn save(
        &self,
        name: &str,
        value: &Value,
        opts: &CodecOptions,
        mode: SaveMode,
    ) -> Result<(), RegistryError>;
}

/// Production [`FileBinding`] backed by the local filesystem.
#[derive(Clone, Default)]
pub struct FileBindery {
    bindings: Arc<RwLock<HashMap<String, Binding>>>,
}

impl FileBindery {
    pub fn new() -> Self {
        Self::default()
    }

    async fn binding(&self, name: &str) -> Result<Binding, RegistryError> {
        self.bindings
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotBound(name.to_string()))
    }
}

#[async_trait]
impl FileBinding for FileBindery {
    async fn bind(&self, name: &str, path: &Path) {
        let format = FileFormat::from_path(path);
        debug!(name, path = %path.display(), ?format, "binding file");
        self.bindings.write().await.insert(
            name.to_string(),
            Binding {
                path: path.to_path_buf(),
                format,
            },
        );
    }

    async fn contains(&self, name: &str) -> bool {
        self.bindings.read().await.contains_key(name)
    }

    async fn exists(&self, name: &str) -> bool {
        match self.bindings.read().await.get(name) {
            Some(binding) => fs::metadata(&binding.path).await.is_ok(),
            None => false,
        }
    }

    async fn load(&self, name: &str, _opts: &CodecOptions) -> Result<Value, RegistryError> {
        let binding = self.binding(name).await?;
        match binding.format {
            FileFormat::Json => {
                let bytes = fs::read(&binding.path)
                    .await
                    .map_err(|e| RegistryError::io("reading", &binding.path, e))?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| RegistryError::codec("decoding json", e))
            }
            FileFormat::Lines => {
                let text = fs::read_to_string(&binding.path)
                    .await
                    .map_err(|e| RegistryError::io("reading", &binding.path, e))?;
                let items = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| Value::String(line.to_string()))
                    .collect();
                Ok(Value::Array(items))
            }
        }
    }

    async fn save(
        &self,
        name: &str,
        value: &Value,
        opts: &CodecOptions,
        mode: SaveMode,
    ) -> Result<(), RegistryError> {
        let binding = self.binding(name).await?;
        if let Some(parent) = binding.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RegistryError::io("creating", parent, e))?;
            }
        }
        match binding.format {
            FileFormat::Json => {
                let bytes = if opts.pretty {
                    serde_json::to_vec_pretty(value)
                } else {
                    serde_json::to_vec(value)
                }
                .map_err(|e| RegistryError::codec("encoding json", e))?;
                fs::write(&binding.path, bytes)
                    .await
                    .map_err(|e| RegistryError::io("writing", &binding.path, e))?;
            }
            FileFormat::Lines => {
                let scalars = scalars_from_json(value)?;
                let mut text = scalars
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                if !text.is_empty() {
                    text.push('\n');
                }
                match mode {
                    SaveMode::Truncate => {
                        fs::write(&binding.path, text)
                            .await
                            .map_err(|e| RegistryError::io("writing", &binding.path, e))?;
                    }
                    SaveMode::Append => {
                        let mut file = fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(&binding.path)
                            .await
                            .map_err(|e| {
                                RegistryError::io("opening for append", &binding.path, e)
                            })?;
                        file.write_all(text.as_bytes())
                            .await
                            .map_err(|e| RegistryError::io("appending", &binding.path, e))?;
                    }
                }
            }
        }
        Ok(())
    }
}
