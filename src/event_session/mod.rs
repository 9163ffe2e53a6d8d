//! EventSession - Collect/Stop State Machine
//!
//! ## Responsibilities
//!
//! - Start a session when a tick crosses the save threshold (outside cooldown)
//! - Backfill the session from the confidence history
//! - Collect samples, latch the peak flag, track inactivity
//! - Finalize the session when any stop condition holds
//!
//! ## States
//!
//! - Idle: no session
//! - Collecting: exactly one session active
//!
//! The manager is pure: it never touches disk or network. The detection loop
//! persists whatever samples the session collected.

use crate::confidence_history::ConfidenceHistory;
use crate::config_store::RuntimeConfig;
use crate::models::{seconds_between, Sample};
use chrono::{DateTime, Local};

/// Session manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Collecting,
}

/// Why a session was finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Peak seen and minimum collection time elapsed
    PeakAfterMinimum,
    /// Maximum collection time elapsed
    MaxDuration,
    /// Very high confidence tick after the first second
    InstantConfidence,
    /// No qualifying detection for the inactivity window
    Inactivity,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::PeakAfterMinimum => "peak_after_minimum",
            StopReason::MaxDuration => "max_duration",
            StopReason::InstantConfidence => "instant_confidence",
            StopReason::Inactivity => "inactivity",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Active session
#[derive(Debug)]
pub struct EventSession {
    pub started_at: DateTime<Local>,
    pub samples: Vec<Sample>,
    pub peak_detected: bool,
    pub last_detection_at: Option<DateTime<Local>>,
    /// Seconds since the last qualifying detection, as of the latest tick
    pub inactivity_secs: f64,
}

impl EventSession {
    fn new(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            samples: Vec::new(),
            peak_detected: false,
            last_detection_at: None,
            inactivity_secs: 0.0,
        }
    }

    /// Seconds since the session started
    pub fn elapsed_secs(&self, now: DateTime<Local>) -> f64 {
        seconds_between(self.started_at, now)
    }
}

/// Session handed over on finalize
#[derive(Debug)]
pub struct FinalizedSession {
    pub started_at: DateTime<Local>,
    pub finalized_at: DateTime<Local>,
    /// Collected samples, chronological
    pub samples: Vec<Sample>,
    pub duration_secs: f64,
    pub peak_detected: bool,
    pub reason: StopReason,
}

impl FinalizedSession {
    /// Confidences of all collected samples, chronological
    pub fn confidences(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.confidence).collect()
    }
}

/// What a tick did to the session
#[derive(Debug, Default)]
pub struct TickReport {
    /// A session started on this tick
    pub started: bool,
    /// Samples copied from history on start
    pub backfilled: usize,
    /// The tick's sample was added to the session
    pub collected: bool,
    /// The peak flag latched on this tick
    pub peak_latched: bool,
    /// Set when the session ended on this tick
    pub finalized: Option<FinalizedSession>,
}

/// Single-session state machine
#[derive(Debug, Default)]
pub struct EventSessionManager {
    session: Option<EventSession>,
    last_notification_at: Option<DateTime<Local>>,
}

impl EventSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Collecting
        } else {
            SessionState::Idle
        }
    }

    /// Active session, if collecting
    pub fn active(&self) -> Option<&EventSession> {
        self.session.as_ref()
    }

    /// Mutable access to the active session's samples (for persistence)
    pub fn active_samples_mut(&mut self) -> Option<&mut [Sample]> {
        self.session.as_mut().map(|s| s.samples.as_mut_slice())
    }

    /// Start the cooldown clock
    pub fn mark_notified(&mut self, at: DateTime<Local>) {
        self.last_notification_at = Some(at);
    }

    pub fn last_notification_at(&self) -> Option<DateTime<Local>> {
        self.last_notification_at
    }

    /// Whether the cooldown allows a new session at `now`
    pub fn cooldown_elapsed(&self, now: DateTime<Local>, cfg: &RuntimeConfig) -> bool {
        match self.last_notification_at {
            None => true,
            Some(at) => seconds_between(at, now) >= cfg.cooldown_period,
        }
    }

    /// Process one tick
    ///
    /// `history` must not yet contain `sample`; the caller pushes it after
    /// the tick so a start never backfills the triggering sample twice.
    pub fn tick(
        &mut self,
        sample: &Sample,
        history: &ConfidenceHistory,
        cfg: &RuntimeConfig,
    ) -> TickReport {
        let now = sample.captured_at;
        let conf = sample.confidence;
        let mut report = TickReport::default();

        if self.session.is_none()
            && conf >= cfg.save_threshold
            && self.cooldown_elapsed(now, cfg)
        {
            report.started = true;
            report.backfilled = self.start(now, history, cfg);
            tracing::info!(
                confidence = conf,
                backfilled = report.backfilled,
                collection_time = cfg.collection_time,
                "Starting screenshot collection (searching for peak moment)"
            );
        }

        let Some(session) = self.session.as_mut() else {
            return report;
        };

        if sample.has_detection() && conf >= cfg.save_threshold {
            session.samples.push(sample.clone());
            session.last_detection_at = Some(now);
            session.inactivity_secs = 0.0;
            report.collected = true;
            tracing::info!(confidence = conf, "Detection added to collection");

            if conf >= cfg.peak_detection_threshold && !session.peak_detected {
                session.peak_detected = true;
                report.peak_latched = true;
                tracing::info!(confidence = conf, "Possible peak detected");
            }
        } else if let Some(last) = session.last_detection_at {
            session.inactivity_secs = seconds_between(last, now);
            if session.inactivity_secs >= 2.0 {
                tracing::info!(inactivity_secs = session.inactivity_secs, "Inactivity period");
            }
        }

        if let Some(reason) = stop_reason(session, conf, now, cfg) {
            report.finalized = self.finalize(now, reason);
        }

        report
    }

    /// Open a session and backfill it; returns the number of backfilled samples
    fn start(
        &mut self,
        now: DateTime<Local>,
        history: &ConfidenceHistory,
        cfg: &RuntimeConfig,
    ) -> usize {
        let mut session = EventSession::new(now);
        session.samples.extend(
            history
                .snapshot()
                .filter(|s| s.confidence >= cfg.save_threshold)
                .map(Sample::to_backfill),
        );
        let backfilled = session.samples.len();
        self.session = Some(session);
        backfilled
    }

    fn finalize(&mut self, now: DateTime<Local>, reason: StopReason) -> Option<FinalizedSession> {
        let session = self.session.take()?;
        let duration_secs = session.elapsed_secs(now);

        tracing::info!(
            duration_secs = duration_secs,
            detections = session.samples.len(),
            reason = %reason,
            "Collection stopped"
        );

        Some(FinalizedSession {
            started_at: session.started_at,
            finalized_at: now,
            samples: session.samples,
            duration_secs,
            peak_detected: session.peak_detected,
            reason,
        })
    }
}

/// First stop condition that holds, checked in a fixed order
fn stop_reason(
    session: &EventSession,
    conf: f32,
    now: DateTime<Local>,
    cfg: &RuntimeConfig,
) -> Option<StopReason> {
    let elapsed = session.elapsed_secs(now);

    if session.peak_detected && elapsed >= cfg.min_collection_time {
        Some(StopReason::PeakAfterMinimum)
    } else if elapsed >= cfg.collection_time {
        Some(StopReason::MaxDuration)
    } else if conf >= cfg.instant_stop_confidence && elapsed >= 1.0 {
        Some(StopReason::InstantConfidence)
    } else if session.inactivity_secs >= cfg.inactivity_stop_time {
        Some(StopReason::Inactivity)
    } else {
        None
    }
}
