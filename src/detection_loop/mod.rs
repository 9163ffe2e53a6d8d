//! DetectionLoop - Frame Processing Driver
//!
//! ## Responsibilities
//!
//! - Read frames, apply the frame-rate gate, run detection
//! - Feed the confidence history and the session state machine
//! - Persist collected samples
//! - On finalize: select frames, run the gate, queue photos, sweep old files
//! - Camera-loss handling and periodic statistics
//!
//! ## Design Principles
//!
//! - History and session are owned by the loop; no locks around them
//! - The only outbound I/O is a non-blocking enqueue; network delivery
//!   happens in the dispatch worker
//! - Every per-tick failure is logged and the loop carries on

mod messages;

pub use messages::{start_message, stop_message};

use crate::artifact_store::ArtifactStore;
use crate::confidence_history::ConfidenceHistory;
use crate::config_store::RuntimeConfig;
use crate::detector::render_off_thread;
use crate::dispatch_queue::DispatchTask;
use crate::event_session::{EventSessionManager, FinalizedSession, StopReason};
use crate::frame_source::FrameSource;
use crate::models::{Frame, Sample};
use crate::notification_gate::{GateDecision, NotificationBurst, NotificationGate, Outbox};
use crate::state::AppContext;
use crate::status_board::{Component, HealthState};
use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::sync::watch;

/// Read frames between statistics log lines
pub const STATS_EVERY_N_FRAMES: u64 = 100;

/// Wait after a failed read before trying again
pub const CAMERA_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Why `run` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested
    Shutdown,
    /// The frame source has no more frames
    EndOfStream,
}

/// Result of a finalized session
#[derive(Debug)]
pub struct SessionOutcome {
    pub reason: StopReason,
    pub burst: NotificationBurst,
    pub decision: GateDecision,
    /// Tasks handed to the dispatch queue
    pub queued: Vec<DispatchTask>,
    /// Files deleted by the retention sweep
    pub swept: usize,
}

/// What one processed frame did
#[derive(Debug, Default)]
pub struct TickSummary {
    pub confidence: f32,
    pub started: bool,
    pub collected: bool,
    pub outcome: Option<SessionOutcome>,
}

/// Loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub notifications: u64,
}

/// The detection loop
pub struct DetectionLoop {
    ctx: AppContext,
    outbox: Outbox,
    history: ConfidenceHistory,
    sessions: EventSessionManager,
    gate: NotificationGate,
    frames_read: u64,
    frames_processed: u64,
    retry_delay: Duration,
}

impl DetectionLoop {
    pub fn new(ctx: AppContext) -> Self {
        let outbox = Outbox::new(
            ctx.artifacts.clone(),
            ctx.detector.clone(),
            ctx.camera_name().to_string(),
        );
        Self {
            ctx,
            outbox,
            history: ConfidenceHistory::new(),
            sessions: EventSessionManager::new(),
            gate: NotificationGate::new(),
            frames_read: 0,
            frames_processed: 0,
            retry_delay: CAMERA_RETRY_DELAY,
        }
    }

    /// Override the wait after a failed read
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn stats(&self) -> LoopStats {
        LoopStats {
            frames_read: self.frames_read,
            frames_processed: self.frames_processed,
            notifications: self.gate.counter(),
        }
    }

    pub fn sessions(&self) -> &EventSessionManager {
        &self.sessions
    }

    pub fn history(&self) -> &ConfidenceHistory {
        &self.history
    }

    /// Count a read frame; true when it should be analyzed
    pub fn admit_frame(&mut self) -> bool {
        self.frames_read += 1;

        if self.frames_read % STATS_EVERY_N_FRAMES == 0 {
            let dispatch = self.ctx.dispatch.stats();
            tracing::info!(
                frames = self.frames_read,
                queue = dispatch.pending(),
                sent = dispatch.sent(),
                failed = dispatch.failed(),
                "Processing statistics"
            );
        }

        let every = self.ctx.config_store.app().process_every_n_frames.max(1);
        self.frames_read % every == 0
    }

    /// Analyze one admitted frame captured at `now`
    pub async fn process_frame(&mut self, frame: Frame, now: DateTime<Local>) -> TickSummary {
        self.frames_processed += 1;
        let cfg = self.ctx.config_store.snapshot().await;

        let detections = match self.ctx.detector.detect(&frame).await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(stage = "detect", kind = e.kind(), error = %e, "Detection failed, treating frame as empty");
                Vec::new()
            }
        };

        let mut sample = Sample::new(now, frame, detections);
        if self.ctx.config_store.app().show_live_feed {
            if let Some(detections) = sample.detections.clone() {
                let detector = self.ctx.detector.clone();
                match render_off_thread(detector, sample.frame.clone(), detections).await {
                    Ok(rendered) => sample.annotated = Some(rendered),
                    Err(e) => {
                        tracing::warn!(stage = "render", error = %e, "Live render failed");
                    }
                }
            }
        }

        let report = self.sessions.tick(&sample, &self.history, &cfg);
        let mut summary = TickSummary {
            confidence: sample.confidence,
            started: report.started,
            collected: report.collected,
            outcome: None,
        };
        self.history.push(sample);

        if let Some(samples) = self.sessions.active_samples_mut() {
            persist_unsaved(&self.ctx.artifacts, samples).await;
        }

        if let Some(mut finalized) = report.finalized {
            persist_unsaved(&self.ctx.artifacts, &mut finalized.samples).await;
            summary.outcome = Some(self.finish_session(finalized, &cfg, now).await);
        }

        summary
    }

    async fn finish_session(
        &mut self,
        session: FinalizedSession,
        cfg: &RuntimeConfig,
        now: DateTime<Local>,
    ) -> SessionOutcome {
        let burst = NotificationBurst::from_session(&session, cfg);
        let decision = self.gate.evaluate(&burst, cfg);

        let mut outcome = SessionOutcome {
            reason: session.reason,
            burst,
            decision,
            queued: Vec::new(),
            swept: 0,
        };

        let GateDecision::Fire(fired) = decision else {
            return outcome;
        };

        let tasks = self
            .outbox
            .compose(&session, &outcome.burst, &fired, cfg.send_annotated_images)
            .await;
        for task in &tasks {
            self.ctx.dispatch.enqueue(task.clone());
        }
        outcome.queued = tasks;

        self.sessions.mark_notified(now);
        tracing::info!(cooldown_secs = cfg.cooldown_period, "Cooldown period started");

        match self.ctx.artifacts.sweep(cfg.max_detections_to_keep).await {
            Ok(removed) => outcome.swept = removed,
            Err(e) => tracing::error!(stage = "retention", error = %e, "Error during cleanup"),
        }

        outcome
    }

    /// Drive the loop until shutdown or end of stream
    pub async fn run(
        &mut self,
        source: &mut dyn FrameSource,
        mut shutdown: watch::Receiver<bool>,
    ) -> LoopExit {
        log_settings(&*self.ctx.config_store.snapshot().await);
        tracing::info!(
            source = %source.describe(),
            every_n_frames = self.ctx.config_store.app().process_every_n_frames,
            "Processing started"
        );

        // None until the first read, then whether the camera is delivering
        let mut camera_ok: Option<bool> = None;

        loop {
            if *shutdown.borrow() {
                return LoopExit::Shutdown;
            }

            let read = tokio::select! {
                _ = shutdown.changed() => return LoopExit::Shutdown,
                read = source.read() => read,
            };

            self.ctx.config_store.reload_if_due().await;

            match read {
                Ok(Some(frame)) => {
                    if camera_ok != Some(true) {
                        let message = if camera_ok == Some(false) {
                            tracing::info!(source = %source.describe(), "Camera connection restored");
                            format!("Connection restored: {}", self.ctx.camera_name())
                        } else {
                            format!("Connected to: {}", self.ctx.camera_name())
                        };
                        camera_ok = Some(true);
                        self.ctx
                            .status
                            .update(Component::Camera, HealthState::Ok, message)
                            .await;
                    }

                    if self.admit_frame() {
                        self.process_frame(frame, Local::now()).await;
                    }
                }
                Ok(None) => {
                    tracing::info!(frames = self.frames_read, "Frame source exhausted");
                    return LoopExit::EndOfStream;
                }
                Err(e) => {
                    tracing::warn!(stage = "capture", kind = e.kind(), error = %e, "Cannot read frame from camera, retrying");
                    if camera_ok != Some(false) {
                        camera_ok = Some(false);
                        self.ctx
                            .status
                            .update(
                                Component::Camera,
                                HealthState::Error,
                                "Disconnected - attempting reconnection",
                            )
                            .await;
                    }

                    tokio::select! {
                        _ = shutdown.changed() => return LoopExit::Shutdown,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }

                    self.ctx.config_store.reload_if_due().await;
                }
            }
        }
    }
}

/// Write every sample that has no file yet
async fn persist_unsaved(artifacts: &ArtifactStore, samples: &mut [Sample]) {
    for sample in samples.iter_mut().filter(|s| s.raw_path.is_none()) {
        if let Err(e) = artifacts.persist(sample).await {
            tracing::error!(stage = "persist", error = %e, "Could not save detection image");
        }
    }
}

fn log_settings(cfg: &RuntimeConfig) {
    tracing::info!(
        save_threshold = cfg.save_threshold,
        notify_threshold = cfg.notify_threshold,
        peak_detection_threshold = cfg.peak_detection_threshold,
        max_screenshots = cfg.max_screenshots,
        min_collection_time = cfg.min_collection_time,
        collection_time = cfg.collection_time,
        inactivity_stop_time = cfg.inactivity_stop_time,
        min_high_confidence_detections = cfg.min_high_confidence_detections,
        send_annotated_images = cfg.send_annotated_images,
        sound_every_n_notifications = cfg.sound_every_n_notifications,
        "Detection settings"
    );
}
