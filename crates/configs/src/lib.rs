use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_cache_root")]
    pub cache_root: String,
    #[serde(default = "default_map_capacity")]
    pub map_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            map_capacity: default_map_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_save_interval")]
    pub save_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            save_interval_secs: default_save_interval(),
        }
    }
}

fn default_cache_root() -> String {
    "cache".to_string()
}
fn default_map_capacity() -> usize {
    1024
}
fn default_save_interval() -> u64 {
    15
}

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.registry.normalize()?;
        self.daemon.validate()?;
        Ok(())
    }
}

impl RegistryConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.cache_root.trim().is_empty() {
            self.cache_root = default_cache_root();
        }
        if self.map_capacity == 0 {
            return Err(anyhow!("registry.map_capacity must be at least 1"));
        }
        Ok(())
    }
}

impl DaemonConfig {
    fn validate(&self) -> Result<()> {
        if self.save_interval_secs == 0 {
            return Err(anyhow!("daemon.save_interval_secs must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.registry.cache_root, "cache");
        assert_eq!(cfg.registry.map_capacity, 1024);
        assert_eq!(cfg.daemon.save_interval_secs, 15);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [registry]
            cache_root = "/tmp/datareg"

            [daemon]
            save_interval_secs = 5
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.registry.cache_root, "/tmp/datareg");
        assert_eq!(cfg.registry.map_capacity, 1024);
        assert_eq!(cfg.daemon.save_interval_secs, 5);
    }

    #[test]
    fn rejects_zero_interval() {
        let mut cfg = AppConfig::default();
        cfg.daemon.save_interval_secs = 0;
        assert!(cfg.normalize_and_validate().is_err());
    }

    #[test]
    fn blank_cache_root_falls_back() {
        let mut cfg = AppConfig::default();
        cfg.registry.cache_root = "  ".into();
        cfg.normalize_and_validate().expect("validate");
        assert_eq!(cfg.registry.cache_root, "cache");
    }
}
