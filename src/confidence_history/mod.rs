//! ConfidenceHistory - Recent Sample Buffer
//!
//! ## Responsibilities
//!
//! - Keep the last few processed samples in chronological order
//! - Provide a lookback snapshot so a new session can backfill its ramp-up
//!
//! Owned by the detection loop only; no locking.

use crate::models::Sample;
use std::collections::VecDeque;

/// Number of samples kept for backfill
pub const HISTORY_CAPACITY: usize = 10;

/// Ring buffer of recent samples
#[derive(Debug)]
pub struct ConfidenceHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl ConfidenceHistory {
    /// Create history with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Create history with a custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        if self.capacity > 0 {
            self.samples.push_back(sample);
        }
    }

    /// Stored samples, oldest first
    pub fn snapshot(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Confidences, oldest first
    pub fn confidences(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.confidence).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for ConfidenceHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frame;
    use chrono::{Duration, Local, TimeZone};

    fn sample(i: i64, conf: f32) -> Sample {
        let at = Local.with_ymd_and_hms(2025, 10, 9, 6, 0, 0).unwrap() + Duration::seconds(i);
        let mut s = Sample::empty(at, Frame::from_jpeg(vec![i as u8]));
        s.confidence = conf;
        s
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = ConfidenceHistory::new();
        for i in 0..25 {
            history.push(sample(i, i as f32 / 100.0));
            assert!(history.len() <= HISTORY_CAPACITY);
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_evicts_oldest_and_keeps_order() {
        let mut history = ConfidenceHistory::new();
        for i in 0..13 {
            history.push(sample(i, i as f32));
        }
        let confs = history.confidences();
        assert_eq!(confs, (3..13).map(|i| i as f32).collect::<Vec<_>>());

        let times: Vec<_> = history.snapshot().map(|s| s.captured_at).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_partial_fill() {
        let mut history = ConfidenceHistory::new();
        history.push(sample(0, 0.2));
        history.push(sample(1, 0.3));
        assert_eq!(history.confidences(), vec![0.2, 0.3]);
        assert!(!history.is_empty());
    }
}
