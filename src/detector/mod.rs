//! Detector - Object Detection Adapter
//!
//! ## Responsibilities
//!
//! - Send frames to the inference server and parse detections
//! - Render annotated copies of frames from stored detections
//! - Startup health check (a missing detector is fatal)
//!
//! ## Wire format
//!
//! `POST {detector_url}/v1/detect` multipart: `image` (JPEG), `model`,
//! `classes`, `conf`. Response: `{"detections": [{x1,y1,x2,y2,conf,label}]}`.

mod annotate;

pub use annotate::render_detections;

use crate::config_store::FALLBACK_MODEL_PATH;
use crate::error::{Error, Result};
use crate::models::{Detection, DetectionSet, Frame};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Class filter sent with every request (the single mounting class)
pub const DETECT_CLASSES: &str = "0";

/// Minimum confidence the server should report
pub const DETECT_MIN_CONFIDENCE: f32 = 0.2;

/// Detection backend
#[async_trait]
pub trait Detector: Send + Sync {
    /// Run inference on one frame
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Annotated copy of `frame`
    fn render(&self, frame: &Frame, detections: &[Detection]) -> Result<Frame> {
        render_detections(frame, detections)
    }
}

/// Run `Detector::render` on the blocking pool
///
/// Decoding and re-encoding a full frame is CPU-bound; keep it off the
/// runtime workers.
pub async fn render_off_thread(
    detector: Arc<dyn Detector>,
    frame: Frame,
    detections: DetectionSet,
) -> Result<Frame> {
    tokio::task::spawn_blocking(move || detector.render(&frame, &detections))
        .await
        .map_err(|e| Error::Internal(format!("render task failed: {}", e)))?
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Inference server client
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl HttpDetector {
    /// Create client with the default 30s timeout
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        })
    }

    /// Model name sent with each request
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check the inference server
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/healthz", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Detector(format!(
                "health check failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Use `model_path` if it exists locally, else the stock model
pub fn resolve_model(model_path: &str) -> String {
    if Path::new(model_path).exists() {
        tracing::info!(model = %model_path, "Using configured model");
        model_path.to_string()
    } else {
        tracing::warn!(
            model = %model_path,
            fallback = FALLBACK_MODEL_PATH,
            "Model not found, falling back to stock model"
        );
        FALLBACK_MODEL_PATH.to_string()
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let url = format!("{}/v1/detect", self.base_url);

        let form = Form::new()
            .part(
                "image",
                Part::bytes(frame.bytes().to_vec())
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("model", self.model.clone())
            .text("classes", DETECT_CLASSES)
            .text("conf", DETECT_MIN_CONFIDENCE.to_string());

        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Detector(format!(
                "inference failed: {} - {}",
                status, body
            )));
        }

        let parsed: DetectResponse = resp.json().await?;
        Ok(parsed.detections)
    }
}
