//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use tracing::warn;

/// Ensure the cache root exists; warn when the config file is absent.
pub async fn ensure_env(cache_root: &str, config_path: &str) -> anyhow::Result<()> {
    if tokio::fs::metadata(config_path).await.is_err() {
        warn!(%config_path, "config file not found; built-in defaults will be used");
    }
    tokio::fs::create_dir_all(cache_root)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {cache_root}: {e}"))?;
    Ok(())
}
