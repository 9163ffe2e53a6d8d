//! ArtifactStore - Detection Images on Disk
//!
//! ## Responsibilities
//!
//! - Persist collected raw frames under stable, downstream-visible names
//! - Write rendered notification copies next to them
//! - Retention sweep: keep only the newest N images
//!
//! ## File names
//!
//! - raw: `mounting_detected_<YYYYMMDD_HHMMSS>_conf<c.cc>.jpg`
//! - backfilled raw: `..._conf<c.cc>_history.jpg`
//! - rendered: `..._conf<c.cc>_annotated.jpg`

use crate::error::Result;
use crate::models::{Frame, Sample, SampleOrigin};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

/// Subdirectory of the data dir holding detection images
pub const DETECTIONS_DIR_NAME: &str = "mounting_detections";

/// Kind of artifact, selects the file name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Raw,
    History,
    Annotated,
}

impl ArtifactKind {
    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Raw => "",
            ArtifactKind::History => "_history",
            ArtifactKind::Annotated => "_annotated",
        }
    }
}

/// File name for an artifact
pub fn artifact_name(timestamp_label: &str, confidence: f32, kind: ArtifactKind) -> String {
    format!(
        "mounting_detected_{}_conf{:.2}{}.jpg",
        timestamp_label,
        confidence,
        kind.suffix()
    )
}

/// Detection image directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (and create) `<data_dir>/mounting_detections`
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join(DETECTIONS_DIR_NAME);
        fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "Detection folder ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the raw frame of a collected sample, once
    ///
    /// Sets `sample.raw_path`; a sample that already has one is left alone.
    pub async fn persist(&self, sample: &mut Sample) -> Result<PathBuf> {
        if let Some(path) = &sample.raw_path {
            return Ok(path.clone());
        }

        let kind = match sample.origin {
            SampleOrigin::Live => ArtifactKind::Raw,
            SampleOrigin::Backfill => ArtifactKind::History,
        };
        let path = self.dir.join(artifact_name(
            &sample.timestamp_label(),
            sample.confidence,
            kind,
        ));
        fs::write(&path, sample.frame.bytes()).await?;

        tracing::info!(
            path = %path.display(),
            confidence = sample.confidence,
            "Detection saved"
        );
        sample.raw_path = Some(path.clone());
        Ok(path)
    }

    /// Write a rendered copy for a sample
    pub async fn write_annotated(&self, sample: &Sample, rendered: &Frame) -> Result<PathBuf> {
        let path = self.dir.join(artifact_name(
            &sample.timestamp_label(),
            sample.confidence,
            ArtifactKind::Annotated,
        ));
        fs::write(&path, rendered.bytes()).await?;
        Ok(path)
    }

    /// Delete all but the `max_keep` most recently modified images
    ///
    /// Returns the number of files removed.
    pub async fn sweep(&self, max_keep: usize) -> Result<usize> {
        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Cannot stat file, skipping");
                    continue;
                }
            };
            files.push((modified, path));
        }

        if files.len() <= max_keep {
            return Ok(0);
        }

        files.sort();
        let excess = files.len() - max_keep;
        let mut removed = 0;
        for (_, path) in files.into_iter().take(excess) {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Error removing old detection");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, kept = max_keep, "Cleaned up old detection files");
        }
        Ok(removed)
    }
}
