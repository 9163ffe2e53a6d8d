//! CowCatcher Library
//!
//! Estrus (mounting) detection watcher for barn cameras
//!
//! ## Architecture (Components)
//!
//! 1. ConfigStore - config.json with 30s hot reload
//! 2. FrameSource - RTSP capture or directory replay
//! 3. Detector - inference server adapter and annotation rendering
//! 4. ConfidenceHistory - last 10 samples for backfill
//! 5. EventSession - collect/stop state machine with peak latch
//! 6. FrameSelector - peak and neighbouring frames of a session
//! 7. NotificationGate - fire/suppress decision, sound throttle, outbox
//! 8. DispatchQueue - single-worker delivery queue
//! 9. TelegramClient - Bot API transport
//! 10. ArtifactStore - detection images and retention sweep
//! 11. StatusBoard - status.json for the web UI
//! 12. DetectionLoop - the driver tying it together
//!
//! ## Design Principles
//!
//! - The detection loop never waits on the network
//! - Session and history are single-owner state, no locking
//! - Config snapshots are immutable; reload swaps the Arc

pub mod artifact_store;
pub mod confidence_history;
pub mod config_store;
pub mod detection_loop;
pub mod detector;
pub mod dispatch_queue;
pub mod error;
pub mod event_session;
pub mod frame_selector;
pub mod frame_source;
pub mod models;
pub mod notification_gate;
pub mod state;
pub mod status_board;
pub mod telegram_client;

pub use error::{Error, Result};
pub use state::AppContext;
