//! Shared models and types for CowCatcher
//!
//! Frames, detections and per-tick samples flow through every component,
//! so they live here to avoid circular dependencies.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Encoded camera frame (JPEG bytes)
///
/// Cloning is cheap; the bytes are shared and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap JPEG bytes
    pub fn from_jpeg(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    /// JPEG bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Bounding box from the detector (pixel coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Single detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BBox,
    #[serde(rename = "conf")]
    pub confidence: f32,
    #[serde(default)]
    pub label: Option<String>,
}

/// Detections of one frame, kept so annotations can be rendered later
pub type DetectionSet = Arc<Vec<Detection>>;

/// Highest-confidence detection of a frame, if any
pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .fold(None, |best: Option<&Detection>, d| match best {
            Some(b) if b.confidence >= d.confidence => Some(b),
            _ => Some(d),
        })
}

/// How a sample ended up in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrigin {
    /// Captured while the session was collecting
    Live,
    /// Copied from the confidence history when the session started
    Backfill,
}

/// One processed tick
#[derive(Debug, Clone)]
pub struct Sample {
    /// Capture time
    pub captured_at: DateTime<Local>,
    /// Highest detection confidence of the tick (0.0 without detections)
    pub confidence: f32,
    /// Owned copy of the frame
    pub frame: Frame,
    /// Detections of the tick, `None` when nothing was detected
    pub detections: Option<DetectionSet>,
    /// Annotated render produced at capture time (live preview enabled)
    pub annotated: Option<Frame>,
    /// Where the raw frame was persisted, once it has been
    pub raw_path: Option<PathBuf>,
    pub origin: SampleOrigin,
}

impl Sample {
    /// Build a sample from a frame and its detections
    pub fn new(captured_at: DateTime<Local>, frame: Frame, detections: Vec<Detection>) -> Self {
        let confidence = best_detection(&detections)
            .map(|d| d.confidence)
            .unwrap_or(0.0);
        let detections = if detections.is_empty() {
            None
        } else {
            Some(Arc::new(detections))
        };

        Self {
            captured_at,
            confidence,
            frame,
            detections,
            annotated: None,
            raw_path: None,
            origin: SampleOrigin::Live,
        }
    }

    /// Sample for a tick whose inference failed or found nothing
    pub fn empty(captured_at: DateTime<Local>, frame: Frame) -> Self {
        Self::new(captured_at, frame, Vec::new())
    }

    /// Whether the detector reported anything this tick
    pub fn has_detection(&self) -> bool {
        self.detections.is_some()
    }

    /// Copy for backfilling a new session
    ///
    /// Backfilled samples never carry a detection handle or a render.
    pub fn to_backfill(&self) -> Self {
        Self {
            captured_at: self.captured_at,
            confidence: self.confidence,
            frame: self.frame.clone(),
            detections: None,
            annotated: None,
            raw_path: None,
            origin: SampleOrigin::Backfill,
        }
    }

    /// `YYYYMMDD_HHMMSS` stamp used in artifact names and captions
    pub fn timestamp_label(&self) -> String {
        self.captured_at.format("%Y%m%d_%H%M%S").to_string()
    }
}

/// Seconds from `from` to `to` (negative if `to` is earlier)
pub fn seconds_between(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
