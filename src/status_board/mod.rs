//! StatusBoard - Component Health File
//!
//! Publishes coarse health for the web UI as `<data_dir>/status.json`:
//! `{ "<component>": { "status", "message", "timestamp" } }`.
//!
//! Writes are best effort. A failure is logged at debug level and never
//! reaches the caller.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const STATUS_FILE_NAME: &str = "status.json";

/// Monitored component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Camera,
    /// Detector (key kept as `yolo` for the web UI)
    Detector,
    Telegram,
    System,
}

impl Component {
    pub fn key(&self) -> &'static str {
        match self {
            Component::Camera => "camera",
            Component::Detector => "yolo",
            Component::Telegram => "telegram",
            Component::System => "system",
        }
    }
}

/// Component state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Ok,
    Error,
    Running,
    Stopped,
}

/// One entry of the status file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub status: HealthState,
    pub message: String,
    pub timestamp: String,
}

/// status.json writer
pub struct StatusBoard {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StatusBoard {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATUS_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a component's state
    pub async fn update(&self, component: Component, status: HealthState, message: impl Into<String>) {
        let _guard = self.lock.lock().await;
        if let Err(e) = self.write_entry(component, status, message.into()).await {
            tracing::debug!(error = %e, "Could not update status file");
        }
    }

    async fn write_entry(
        &self,
        component: Component,
        status: HealthState,
        message: String,
    ) -> crate::Result<()> {
        let mut board = self.read_all().await;
        board.insert(
            component.key().to_string(),
            serde_json::to_value(ComponentStatus {
                status,
                message,
                timestamp: Local::now().to_rfc3339(),
            })?,
        );
        let json = serde_json::to_string_pretty(&board)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Current file content; unreadable or malformed files count as empty
    pub async fn read_all(&self) -> BTreeMap<String, serde_json::Value> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Parsed entry for one component
    pub async fn get(&self, component: Component) -> Option<ComponentStatus> {
        let board = self.read_all().await;
        board
            .get(component.key())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let board = StatusBoard::new(dir.path());

        board.update(Component::Camera, HealthState::Ok, "Connected to: Barn").await;
        board.update(Component::Detector, HealthState::Error, "down").await;

        let camera = board.get(Component::Camera).await.unwrap();
        assert_eq!(camera.status, HealthState::Ok);
        assert_eq!(camera.message, "Connected to: Barn");

        let raw = std::fs::read_to_string(board.path()).unwrap();
        assert!(raw.contains("\"yolo\""));
        assert!(raw.contains("\"error\""));
    }

    #[tokio::test]
    async fn test_keeps_unknown_entries() {
        let dir = tempfile::tempdir().unwrap();
        let board = StatusBoard::new(dir.path());
        std::fs::write(board.path(), r#"{"webui": {"status": "ok"}}"#).unwrap();

        board.update(Component::System, HealthState::Running, "").await;
        let all = board.read_all().await;
        assert!(all.contains_key("webui"));
        assert!(all.contains_key("system"));
    }

    #[tokio::test]
    async fn test_unwritable_path_is_silent() {
        let board = StatusBoard::new(Path::new("/nonexistent/cowcatcher"));
        board.update(Component::Telegram, HealthState::Ok, "x").await;
        assert!(board.get(Component::Telegram).await.is_none());
    }
}
