//! ConfigStore - Runtime Configuration with Hot Reload
//!
//! ## Responsibilities
//!
//! - Load `config.json` at startup (startup-only and tunable views)
//! - Re-read the file every reload interval and swap the tunables snapshot
//! - Keep the last good snapshot when a reload fails
//!
//! ## Design Principles
//!
//! - Readers take an `Arc<RuntimeConfig>` per tick; a swap never mutates a
//!   snapshot somebody already holds
//! - The file is the single source of truth; the web UI writes it, we read it

mod repository;
mod types;

pub use repository::{ConfigRepository, CONFIG_FILE_NAME};
pub use types::*;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Interval between config file checks
pub const CONFIG_RELOAD_INTERVAL: Duration = Duration::from_secs(30);

/// ConfigStore instance
pub struct ConfigStore {
    repo: ConfigRepository,
    app: AppConfig,
    current: RwLock<Arc<RuntimeConfig>>,
    last_check: Mutex<Instant>,
    reload_interval: Duration,
}

impl ConfigStore {
    /// Open the store and load the initial config
    ///
    /// A broken file at startup is logged and replaced by the defaults.
    pub async fn open(data_dir: &Path) -> Self {
        let repo = ConfigRepository::new(data_dir);
        let initial = match repo.load().await {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(
                    path = %repo.path().display(),
                    error = %e,
                    "Could not load config file, using defaults"
                );
                PersistedConfig::default()
            }
        };

        Self::from_parts(repo, initial)
    }

    /// Build a store around an already loaded config
    pub fn from_parts(repo: ConfigRepository, initial: PersistedConfig) -> Self {
        Self {
            repo,
            app: initial.app,
            current: RwLock::new(Arc::new(initial.runtime)),
            last_check: Mutex::new(Instant::now()),
            reload_interval: CONFIG_RELOAD_INTERVAL,
        }
    }

    /// Override the reload interval
    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    /// Startup-only settings
    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Latest tunables snapshot
    pub async fn snapshot(&self) -> Arc<RuntimeConfig> {
        self.current.read().await.clone()
    }

    /// Reload if the interval has elapsed since the last check
    ///
    /// Returns true when a new snapshot was installed.
    pub async fn reload_if_due(&self) -> bool {
        {
            let mut last = self.last_check.lock().await;
            if last.elapsed() < self.reload_interval {
                return false;
            }
            *last = Instant::now();
        }

        match self.reload().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Error reloading config, keeping previous settings");
                false
            }
        }
    }

    /// Re-read the file now and swap the snapshot
    pub async fn reload(&self) -> crate::Result<()> {
        let loaded = self.repo.load().await?;
        let next = Arc::new(loaded.runtime);

        let mut current = self.current.write().await;
        if **current != *next {
            tracing::info!(
                save_threshold = next.save_threshold,
                notify_threshold = next.notify_threshold,
                peak_detection_threshold = next.peak_detection_threshold,
                cooldown_period = next.cooldown_period,
                "Configuration reloaded with changes"
            );
        } else {
            tracing::debug!("Configuration reloaded, no changes");
        }
        *current = next;

        Ok(())
    }
}
