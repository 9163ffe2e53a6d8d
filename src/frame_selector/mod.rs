//! FrameSelector - Representative Frames of a Session
//!
//! Picks the peak sample and its neighbours from a finalized session.
//!
//! - Short sessions (two samples or fewer) offer every sample
//! - Longer sessions offer `{peak-1, peak, peak+1}`, ascending
//! - Either way the list is truncated to `max_screenshots` (with the default
//!   of 2 the after-peak frame drops out)

use std::fmt;

/// Position of a selected frame relative to the peak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BestCapture,
    ExtraCapture,
    BeforePeak,
    Peak,
    AfterPeak,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::BestCapture => "Best capture",
            Stage::ExtraCapture => "Extra capture",
            Stage::BeforePeak => "Before peak",
            Stage::Peak => "Peak",
            Stage::AfterPeak => "After peak",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One selected frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedFrame {
    /// Index into the session's sample list
    pub index: usize,
    pub stage: Stage,
}

/// Index of the highest confidence; the earliest wins on ties
pub fn peak_index(confidences: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &c) in confidences.iter().enumerate() {
        match best {
            Some((_, b)) if b >= c => {}
            _ => best = Some((i, c)),
        }
    }
    best.map(|(i, _)| i)
}

/// Select frames from a session's confidences (chronological)
pub fn select(confidences: &[f32], max_screenshots: usize) -> Vec<SelectedFrame> {
    let Some(peak) = peak_index(confidences) else {
        return Vec::new();
    };
    let len = confidences.len();

    let candidates: Vec<usize> = if len <= 2 {
        (0..len).collect()
    } else {
        let mut around = Vec::with_capacity(3);
        if peak > 0 {
            around.push(peak - 1);
        }
        around.push(peak);
        if peak + 1 < len {
            around.push(peak + 1);
        }
        around
    };

    candidates
        .into_iter()
        .take(max_screenshots)
        .map(|index| SelectedFrame {
            index,
            stage: stage_for(index, peak, len),
        })
        .collect()
}

/// Labels depend on the session length, not on how many frames survive truncation
fn stage_for(index: usize, peak: usize, len: usize) -> Stage {
    if len <= 2 {
        return if index == peak {
            Stage::BestCapture
        } else {
            Stage::ExtraCapture
        };
    }
    match index.cmp(&peak) {
        std::cmp::Ordering::Less => Stage::BeforePeak,
        std::cmp::Ordering::Equal => Stage::Peak,
        std::cmp::Ordering::Greater => Stage::AfterPeak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(frames: &[SelectedFrame]) -> Vec<usize> {
        frames.iter().map(|f| f.index).collect()
    }

    fn stages(frames: &[SelectedFrame]) -> Vec<Stage> {
        frames.iter().map(|f| f.stage).collect()
    }

    #[test]
    fn test_peak_tie_prefers_earliest() {
        assert_eq!(peak_index(&[0.8, 0.9, 0.9, 0.7]), Some(1));
        assert_eq!(peak_index(&[]), None);
    }

    #[test]
    fn test_middle_peak_drops_after_frame() {
        let frames = select(&[0.8, 0.95, 0.9], 2);
        assert_eq!(indices(&frames), vec![0, 1]);
        assert_eq!(stages(&frames), vec![Stage::BeforePeak, Stage::Peak]);
    }

    #[test]
    fn test_first_peak_has_no_before() {
        let frames = select(&[0.95, 0.8, 0.9], 2);
        assert_eq!(indices(&frames), vec![0, 1]);
        assert_eq!(stages(&frames), vec![Stage::Peak, Stage::AfterPeak]);
    }

    #[test]
    fn test_last_peak_has_no_after() {
        let frames = select(&[0.8, 0.85, 0.95], 2);
        assert_eq!(indices(&frames), vec![1, 2]);
        assert_eq!(stages(&frames), vec![Stage::BeforePeak, Stage::Peak]);
    }

    #[test]
    fn test_three_screenshots_keep_neighbours() {
        let frames = select(&[0.76, 0.91, 0.95, 0.93], 3);
        assert_eq!(indices(&frames), vec![1, 2, 3]);
        assert_eq!(
            stages(&frames),
            vec![Stage::BeforePeak, Stage::Peak, Stage::AfterPeak]
        );
    }

    #[test]
    fn test_short_session_selects_all() {
        let frames = select(&[0.8, 0.9], 2);
        assert_eq!(indices(&frames), vec![0, 1]);
        assert_eq!(stages(&frames), vec![Stage::ExtraCapture, Stage::BestCapture]);

        let single = select(&[0.9], 2);
        assert_eq!(stages(&single), vec![Stage::BestCapture]);
    }

    #[test]
    fn test_short_session_respects_max_screenshots() {
        let frames = select(&[0.8, 0.9], 1);
        assert_eq!(indices(&frames), vec![0]);
        assert_eq!(stages(&frames), vec![Stage::ExtraCapture]);

        assert!(select(&[0.8, 0.9], 0).is_empty());
    }

    #[test]
    fn test_empty_session() {
        assert!(select(&[], 2).is_empty());
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::BeforePeak.to_string(), "Before peak");
        assert_eq!(Stage::ExtraCapture.to_string(), "Extra capture");
    }
}
