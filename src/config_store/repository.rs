//! ConfigStore Repository
//!
//! File access layer for `config.json`

use super::types::PersistedConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Config file name inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Reads and writes the persisted configuration file
#[derive(Debug, Clone)]
pub struct ConfigRepository {
    path: PathBuf,
}

impl ConfigRepository {
    /// Create repository for `<data_dir>/config.json`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CONFIG_FILE_NAME),
        }
    }

    /// Path of the config file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a config file exists yet
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Load the config
    ///
    /// A missing file yields the defaults. An unreadable or malformed file is
    /// an error so callers can keep whatever they had before.
    pub async fn load(&self) -> Result<PersistedConfig> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No config file, using defaults");
                return Ok(PersistedConfig::default());
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("{} is not valid JSON: {}", self.path.display(), e))
        })?;

        PersistedConfig::from_value(value)
    }

    /// Write the config (temp file + rename, so readers never see half a file)
    pub async fn save(&self, config: &PersistedConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&config.to_value()?)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;

        tracing::info!(path = %self.path.display(), "Config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConfigRepository::new(dir.path());
        assert!(!repo.exists().await);
        let cfg = repo.load().await.unwrap();
        assert_eq!(cfg.runtime.save_threshold, 0.75);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConfigRepository::new(dir.path());

        let mut cfg = PersistedConfig::default();
        cfg.runtime.cooldown_period = 12.0;
        cfg.app.camera_name = "Stable".to_string();
        repo.save(&cfg).await.unwrap();

        assert!(repo.exists().await);
        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded.runtime.cooldown_period, 12.0);
        assert_eq!(loaded.app.camera_name, "Stable");
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConfigRepository::new(dir.path());
        std::fs::write(repo.path(), "{ not json").unwrap();
        assert!(matches!(repo.load().await, Err(Error::Config(_))));
    }
}
