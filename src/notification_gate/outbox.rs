//! Outbox: turns a fired burst into photo dispatch tasks
//!
//! Image choice per selected sample:
//! 1. annotations disabled: the raw file
//! 2. render captured at detection time: written as `_annotated` and sent
//! 3. detections available: rendered from the raw file on disk
//! 4. anything else (or a failed render): the raw file

use super::{Fired, NotificationBurst};
use crate::artifact_store::ArtifactStore;
use crate::detector::{render_off_thread, Detector};
use crate::dispatch_queue::DispatchTask;
use crate::event_session::FinalizedSession;
use crate::frame_selector::Stage;
use crate::models::{Frame, Sample};
use std::path::PathBuf;
use std::sync::Arc;

/// Photo caption
pub fn caption(
    camera_name: &str,
    sample: &Sample,
    stage: Stage,
    rank: usize,
    total: usize,
    duration_secs: f64,
    play_sound: bool,
) -> String {
    let indicator = if play_sound { "🔊" } else { "🔇" };
    format!(
        "{} Mounting detected - {}\nTime: {}\nConfidence: {:.2}\nStage: {} - Rank {}/{}\nEvent duration: {:.1}s\n",
        indicator,
        camera_name,
        sample.timestamp_label(),
        sample.confidence,
        stage,
        rank,
        total,
        duration_secs
    )
}

/// Composes notification photos
pub struct Outbox {
    artifacts: ArtifactStore,
    detector: Arc<dyn Detector>,
    camera_name: String,
}

impl Outbox {
    pub fn new(artifacts: ArtifactStore, detector: Arc<dyn Detector>, camera_name: impl Into<String>) -> Self {
        Self {
            artifacts,
            detector,
            camera_name: camera_name.into(),
        }
    }

    /// One `Photo` task per selected sample, in selection order
    pub async fn compose(
        &self,
        session: &FinalizedSession,
        burst: &NotificationBurst,
        fired: &Fired,
        send_annotated: bool,
    ) -> Vec<DispatchTask> {
        let total = burst.selected.len();
        let mut tasks = Vec::with_capacity(total);

        for (rank, selected) in burst.selected.iter().enumerate() {
            let Some(sample) = session.samples.get(selected.index) else {
                tracing::warn!(index = selected.index, "Selected index outside session");
                continue;
            };

            let Some(path) = self.image_for(sample, send_annotated).await else {
                tracing::warn!(
                    timestamp = %sample.timestamp_label(),
                    "No image on disk for selected frame, skipping"
                );
                continue;
            };

            tracing::info!(
                stage = %selected.stage,
                confidence = sample.confidence,
                with_sound = fired.play_sound,
                "Telegram queued"
            );

            tasks.push(DispatchTask::Photo {
                path,
                caption: caption(
                    &self.camera_name,
                    sample,
                    selected.stage,
                    rank + 1,
                    total,
                    burst.duration_secs,
                    fired.play_sound,
                ),
                silent: !fired.play_sound,
            });
        }

        tasks
    }

    async fn image_for(&self, sample: &Sample, send_annotated: bool) -> Option<PathBuf> {
        if !send_annotated {
            return sample.raw_path.clone();
        }

        if let Some(rendered) = &sample.annotated {
            return match self.artifacts.write_annotated(sample, rendered).await {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::error!(error = %e, "Could not write annotated image, sending original");
                    sample.raw_path.clone()
                }
            };
        }

        let raw_path = sample.raw_path.clone()?;
        let Some(detections) = &sample.detections else {
            tracing::info!(
                timestamp = %sample.timestamp_label(),
                "No detections available, sending original"
            );
            return Some(raw_path);
        };

        let raw = match tokio::fs::read(&raw_path).await {
            Ok(bytes) => Frame::from_jpeg(bytes),
            Err(e) => {
                tracing::info!(
                    path = %raw_path.display(),
                    error = %e,
                    "Could not load original frame, sending original"
                );
                return Some(raw_path);
            }
        };

        let rendered = match render_off_thread(self.detector.clone(), raw, detections.clone()).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Annotation render failed, sending original");
                return Some(raw_path);
            }
        };

        match self.artifacts.write_annotated(sample, &rendered).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!(error = %e, "Could not write annotated image, sending original");
                Some(raw_path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::RuntimeConfig;
    use crate::error::Result;
    use crate::event_session::StopReason;
    use crate::models::{BBox, Detection};
    use async_trait::async_trait;
    use chrono::{Duration, Local, TimeZone};

    /// Renders by appending a marker byte
    struct MarkerDetector;

    #[async_trait]
    impl Detector for MarkerDetector {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn render(&self, frame: &Frame, _detections: &[Detection]) -> Result<Frame> {
            let mut bytes = frame.bytes().to_vec();
            bytes.push(0xAA);
            Ok(Frame::from_jpeg(bytes))
        }
    }

    fn det(conf: f32) -> Detection {
        Detection {
            bbox: BBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 },
            confidence: conf,
            label: None,
        }
    }

    async fn session(store: &ArtifactStore, confs: &[f32]) -> FinalizedSession {
        let start = Local.with_ymd_and_hms(2025, 10, 9, 5, 0, 0).unwrap();
        let mut samples = Vec::new();
        for (i, &c) in confs.iter().enumerate() {
            let mut s = Sample::new(
                start + Duration::seconds(i as i64),
                Frame::from_jpeg(vec![i as u8]),
                vec![det(c)],
            );
            store.persist(&mut s).await.unwrap();
            samples.push(s);
        }
        FinalizedSession {
            started_at: start,
            finalized_at: start + Duration::seconds(4),
            samples,
            duration_secs: 4.0,
            peak_detected: true,
            reason: StopReason::PeakAfterMinimum,
        }
    }

    #[test]
    fn test_caption_format() {
        let at = Local.with_ymd_and_hms(2025, 10, 9, 5, 12, 7).unwrap();
        let mut s = Sample::empty(at, Frame::from_jpeg(vec![1]));
        s.confidence = 0.951;
        let text = caption("Barn", &s, Stage::Peak, 2, 2, 4.04, false);
        assert_eq!(
            text,
            "🔇 Mounting detected - Barn\nTime: 20251009_051207\nConfidence: 0.95\nStage: Peak - Rank 2/2\nEvent duration: 4.0s\n"
        );
        assert!(caption("Barn", &s, Stage::Peak, 1, 1, 1.0, true).starts_with("🔊"));
    }

    #[tokio::test]
    async fn test_compose_renders_from_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).await.unwrap();
        let outbox = Outbox::new(store.clone(), Arc::new(MarkerDetector), "Barn");

        let session = session(&store, &[0.76, 0.91, 0.95, 0.93]).await;
        let cfg = RuntimeConfig::default();
        let burst = NotificationBurst::from_session(&session, &cfg);
        let fired = Fired { number: 1, play_sound: false };

        let tasks = outbox.compose(&session, &burst, &fired, true).await;
        assert_eq!(tasks.len(), 2);

        let DispatchTask::Photo { path, caption, silent } = &tasks[0] else {
            panic!("expected photo");
        };
        assert!(path.to_string_lossy().ends_with("_conf0.91_annotated.jpg"));
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 0xAA]);
        assert!(caption.contains("Stage: Before peak - Rank 1/2"));
        assert!(*silent);
    }

    #[tokio::test]
    async fn test_compose_raw_when_annotations_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).await.unwrap();
        let outbox = Outbox::new(store.clone(), Arc::new(MarkerDetector), "Barn");

        let session = session(&store, &[0.9, 0.95]).await;
        let burst = NotificationBurst::from_session(&session, &RuntimeConfig::default());
        let fired = Fired { number: 5, play_sound: true };

        let tasks = outbox.compose(&session, &burst, &fired, false).await;
        let paths: Vec<&PathBuf> = tasks
            .iter()
            .map(|t| match t {
                DispatchTask::Photo { path, silent, .. } => {
                    assert!(!silent);
                    path
                }
                other => panic!("unexpected task {:?}", other),
            })
            .collect();
        assert_eq!(paths[0], session.samples[0].raw_path.as_ref().unwrap());
        assert_eq!(paths[1], session.samples[1].raw_path.as_ref().unwrap());
    }

    #[tokio::test]
    async fn test_backfilled_sample_sent_raw_and_prerendered_reused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).await.unwrap();
        let outbox = Outbox::new(store.clone(), Arc::new(MarkerDetector), "Barn");

        let mut session = session(&store, &[0.9, 0.95]).await;
        let mut backfilled = session.samples[0].to_backfill();
        store.persist(&mut backfilled).await.unwrap();
        session.samples[0] = backfilled;
        session.samples[1].annotated = Some(Frame::from_jpeg(vec![7, 7]));

        let burst = NotificationBurst::from_session(&session, &RuntimeConfig::default());
        let fired = Fired { number: 1, play_sound: false };
        let tasks = outbox.compose(&session, &burst, &fired, true).await;

        let paths: Vec<PathBuf> = tasks
            .into_iter()
            .filter_map(|t| match t {
                DispatchTask::Photo { path, .. } => Some(path),
                _ => None,
            })
            .collect();
        assert!(paths[0].to_string_lossy().ends_with("_history.jpg"));
        assert!(paths[1].to_string_lossy().ends_with("_annotated.jpg"));
        assert_eq!(std::fs::read(&paths[1]).unwrap(), vec![7, 7]);
    }
}
