//! Start/stop text messages

use chrono::{DateTime, Local};

const DISCLAIMER: &str = "⚠️ DISCLAIMER: Use at your own risk. This program uses Ultralytics YOLO and is subject to the GNU Affero General Public License v3.0 (AGPL-3.0).";

/// Sent once the loop is about to start
pub fn start_message(camera_name: &str, now: DateTime<Local>) -> String {
    format!(
        "📋 Cowcatcher detection script started\nCamera: {}\nTime: {}\n\n{}",
        camera_name,
        now.format("%Y-%m-%d %H:%M:%S"),
        DISCLAIMER
    )
}

/// Sent directly (not queued) after the worker has stopped
pub fn stop_message(
    now: DateTime<Local>,
    reason: &str,
    frames: u64,
    sent: u64,
    failed: u64,
) -> String {
    format!(
        "⚠️ WARNING: Cowcatcher detection script stopped at {}\nReason: {}\nTotal frames processed: {}\nNotifications sent: {}\nFailed: {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        reason,
        frames,
        sent,
        failed
    )
}
