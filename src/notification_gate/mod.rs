//! NotificationGate - Fire/Suppress Decision and Sound Throttle
//!
//! ## Responsibilities
//!
//! - Summarize a finalized session into a burst (selection + statistics)
//! - Decide whether the burst is strong enough to notify
//! - Count notifications; every Nth one plays a sound
//! - Compose the photo tasks for a fired burst (see `outbox`)
//!
//! The statistics cover every sample of the session, including the ones
//! backfilled from before the trigger, not just the selected frames.

mod outbox;

pub use outbox::{caption, Outbox};

use crate::config_store::RuntimeConfig;
use crate::event_session::FinalizedSession;
use crate::frame_selector::{self, SelectedFrame};

/// Summary of a finalized session, consumed by the gate
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationBurst {
    pub selected: Vec<SelectedFrame>,
    pub max_confidence: f32,
    /// Samples at or above the notify threshold
    pub high_confidence_count: usize,
    pub sample_count: usize,
    pub duration_secs: f64,
}

impl NotificationBurst {
    pub fn from_session(session: &FinalizedSession, cfg: &RuntimeConfig) -> Self {
        Self::from_confidences(&session.confidences(), session.duration_secs, cfg)
    }

    pub fn from_confidences(confidences: &[f32], duration_secs: f64, cfg: &RuntimeConfig) -> Self {
        Self {
            selected: frame_selector::select(confidences, cfg.max_screenshots),
            max_confidence: confidences.iter().copied().fold(0.0, f32::max),
            high_confidence_count: confidences
                .iter()
                .filter(|&&c| c >= cfg.notify_threshold)
                .count(),
            sample_count: confidences.len(),
            duration_secs,
        }
    }
}

/// Why a burst did not fire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Suppression {
    /// Session ended without any collected sample
    Empty,
    LowConfidence { max: f32, threshold: f32 },
    TooFewHighConfidence { count: usize, required: usize },
}

/// A fired notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    /// 1-based notification number
    pub number: u64,
    pub play_sound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Fire(Fired),
    Suppress(Suppression),
}

/// Gate with the persistent notification counter
#[derive(Debug, Default)]
pub struct NotificationGate {
    counter: u64,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications fired so far
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Evaluate a burst; firing advances the counter
    pub fn evaluate(&mut self, burst: &NotificationBurst, cfg: &RuntimeConfig) -> GateDecision {
        tracing::info!(
            high_confidence = burst.high_confidence_count,
            required = cfg.min_high_confidence_detections,
            "Number of high confidence detections"
        );

        if burst.sample_count == 0 {
            tracing::info!("Session collected no detections. No notification sent.");
            return GateDecision::Suppress(Suppression::Empty);
        }

        if burst.max_confidence < cfg.notify_threshold {
            tracing::info!(
                max_confidence = burst.max_confidence,
                notify_threshold = cfg.notify_threshold,
                "Highest confidence lower than notify threshold. No notification sent."
            );
            return GateDecision::Suppress(Suppression::LowConfidence {
                max: burst.max_confidence,
                threshold: cfg.notify_threshold,
            });
        }

        if burst.high_confidence_count < cfg.min_high_confidence_detections {
            tracing::info!(
                count = burst.high_confidence_count,
                required = cfg.min_high_confidence_detections,
                "Too few high confidence detections. No notification sent."
            );
            return GateDecision::Suppress(Suppression::TooFewHighConfidence {
                count: burst.high_confidence_count,
                required: cfg.min_high_confidence_detections,
            });
        }

        self.counter += 1;
        let every = u64::from(cfg.sound_every_n_notifications);
        let play_sound = every > 0 && self.counter % every == 0;

        if play_sound {
            tracing::info!(number = self.counter, "Sound notification queued");
        } else {
            tracing::info!(
                number = self.counter,
                sound_every = cfg.sound_every_n_notifications,
                "Silent notification queued"
            );
        }

        GateDecision::Fire(Fired {
            number: self.counter,
            play_sound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_selector::Stage;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::default()
    }

    fn burst(confs: &[f32]) -> NotificationBurst {
        NotificationBurst::from_confidences(confs, 5.0, &cfg())
    }

    #[test]
    fn test_burst_statistics() {
        let b = burst(&[0.76, 0.91, 0.95, 0.93]);
        assert_eq!(b.max_confidence, 0.95);
        assert_eq!(b.high_confidence_count, 3);
        assert_eq!(b.selected.len(), 2);
        assert_eq!(b.selected[1].stage, Stage::Peak);
    }

    #[test]
    fn test_burst_never_exceeds_max_screenshots() {
        let one = RuntimeConfig {
            max_screenshots: 1,
            ..cfg()
        };
        let b = NotificationBurst::from_confidences(&[0.9, 0.95], 2.0, &one);
        assert_eq!(b.selected.len(), 1);
        assert_eq!(b.sample_count, 2);
    }

    #[test]
    fn test_fires_on_boundary_values() {
        let mut gate = NotificationGate::new();
        // exactly notify_threshold, exactly the required count
        let decision = gate.evaluate(&burst(&[0.86, 0.86, 0.86]), &cfg());
        assert!(matches!(decision, GateDecision::Fire(_)));
    }

    #[test]
    fn test_low_confidence_suppressed() {
        let mut gate = NotificationGate::new();
        let decision = gate.evaluate(&burst(&[0.8, 0.85, 0.84]), &cfg());
        assert!(matches!(
            decision,
            GateDecision::Suppress(Suppression::LowConfidence { .. })
        ));
        assert_eq!(gate.counter(), 0);
    }

    #[test]
    fn test_too_few_high_confidence_suppressed() {
        let mut gate = NotificationGate::new();
        let decision = gate.evaluate(&burst(&[0.9, 0.95, 0.8]), &cfg());
        assert_eq!(
            decision,
            GateDecision::Suppress(Suppression::TooFewHighConfidence {
                count: 2,
                required: 3
            })
        );
    }

    #[test]
    fn test_empty_session_suppressed() {
        let mut gate = NotificationGate::new();
        let decision = gate.evaluate(&burst(&[]), &cfg());
        assert_eq!(decision, GateDecision::Suppress(Suppression::Empty));
    }

    #[test]
    fn test_sound_every_nth() {
        let mut gate = NotificationGate::new();
        let b = burst(&[0.9, 0.9, 0.9]);
        let sounds: Vec<bool> = (0..10)
            .map(|_| match gate.evaluate(&b, &cfg()) {
                GateDecision::Fire(f) => f.play_sound,
                GateDecision::Suppress(_) => panic!("should fire"),
            })
            .collect();
        let expected: Vec<bool> = (1..=10).map(|n| n % 5 == 0).collect();
        assert_eq!(sounds, expected);
    }

    #[test]
    fn test_sound_disabled_with_zero() {
        let mut gate = NotificationGate::new();
        let cfg = RuntimeConfig {
            sound_every_n_notifications: 0,
            ..RuntimeConfig::default()
        };
        let b = NotificationBurst::from_confidences(&[0.9, 0.9, 0.9], 1.0, &cfg);
        for _ in 0..3 {
            assert!(matches!(
                gate.evaluate(&b, &cfg),
                GateDecision::Fire(Fired { play_sound: false, .. })
            ));
        }
    }
}
