use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Codec {
        context: &'static str,
        source: serde_json::Error,
    },
    #[error("no file bound for \"{0}\"")]
    NotBound(String),
}

impl RegistryError {
    pub fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn codec(context: &'static str, source: serde_json::Error) -> Self {
        Self::Codec { context, source }
    }
}
