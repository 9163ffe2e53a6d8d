//! Application context
//!
//! Everything the detection loop and the shutdown path share, built once at
//! startup and passed by reference.

use crate::artifact_store::ArtifactStore;
use crate::config_store::ConfigStore;
use crate::detector::Detector;
use crate::dispatch_queue::DispatchHandle;
use crate::status_board::StatusBoard;
use std::sync::Arc;

/// Shared components
#[derive(Clone)]
pub struct AppContext {
    pub config_store: Arc<ConfigStore>,
    pub detector: Arc<dyn Detector>,
    pub artifacts: ArtifactStore,
    pub dispatch: DispatchHandle,
    pub status: Arc<StatusBoard>,
}

impl AppContext {
    /// Camera name used in captions and messages
    pub fn camera_name(&self) -> &str {
        &self.config_store.app().camera_name
    }
}
