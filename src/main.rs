//! CowCatcher - Estrus Detection Watcher
//!
//! Main entry point: wires the components, runs the detection loop and
//! performs the best-effort shutdown.

use clap::Parser;
use cowcatcher::{
    artifact_store::ArtifactStore,
    config_store::{ConfigRepository, ConfigStore, PersistedConfig},
    detection_loop::{start_message, stop_message, DetectionLoop, LoopExit},
    detector::{resolve_model, HttpDetector},
    dispatch_queue::{self, DispatchHandle, WORKER_JOIN_TIMEOUT},
    frame_source::{DirectoryReplaySource, FrameSource, RtspStreamSource},
    state::AppContext,
    status_board::{Component, HealthState, StatusBoard},
    telegram_client::{TelegramClient, Transport},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log file inside the data dir
const LOG_FILE_NAME: &str = "cowcatcher.log";

#[derive(Parser, Debug)]
#[command(name = "cowcatcher")]
#[command(about = "Watches a barn camera for mounting behaviour and notifies via Telegram")]
struct Args {
    /// Data directory (config.json, status.json, detections, log)
    #[arg(long, env = "COWCATCHER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Write a default config.json if none exists, then exit
    #[arg(long)]
    init_config: bool,

    /// Seconds to wait for queued notifications on shutdown
    #[arg(long, default_value_t = 60)]
    drain_timeout_secs: u64,

    /// Delay between replayed frames in developer mode (0 = as fast as possible)
    #[arg(long, default_value_t = 200)]
    replay_interval_ms: u64,
}

/// `/app/data` inside the container, `./data` elsewhere
fn default_data_dir() -> PathBuf {
    if Path::new("/app").exists() {
        PathBuf::from("/app/data")
    } else {
        PathBuf::from("data")
    }
}

fn init_tracing(data_dir: &Path) {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(LOG_FILE_NAME));

    let file_layer = match log_file {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("cannot open log file in {}: {}", data_dir.display(), e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cowcatcher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
}

/// Resolves once Ctrl+C (or SIGTERM on unix) arrives
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Script manually stopped by user (Ctrl+C)",
        _ = terminate => "Script stopped by termination signal",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)?;

    init_tracing(&data_dir);
    tracing::info!(
        data_dir = %data_dir.display(),
        "Starting CowCatcher v{}",
        env!("CARGO_PKG_VERSION")
    );

    if args.init_config {
        let repo = ConfigRepository::new(&data_dir);
        if repo.exists().await {
            tracing::info!(path = %repo.path().display(), "Config already exists, leaving it untouched");
        } else {
            repo.save(&PersistedConfig::default()).await?;
        }
        return Ok(());
    }

    // Configuration
    let config_store = Arc::new(ConfigStore::open(&data_dir).await);
    let app = config_store.app().clone();
    tracing::info!(
        camera = %app.camera_name,
        detector_url = %app.detector_url,
        recipients = app.telegram_chat_ids.len(),
        show_live_feed = app.show_live_feed,
        "Configuration loaded"
    );

    let status = Arc::new(StatusBoard::new(&data_dir));

    // Detector (fatal when unreachable)
    let model = resolve_model(&app.model_path);
    let detector = Arc::new(HttpDetector::new(app.detector_url.clone(), model)?);
    if let Err(e) = detector.health_check().await {
        tracing::error!(error = %e, detector_url = %app.detector_url, "Detector not available");
        status
            .update(Component::Detector, HealthState::Error, format!("Detector not available: {}", e))
            .await;
        return Err(e.into());
    }
    tracing::info!(
        model = %detector.model(),
        timeout_secs = detector.timeout().as_secs(),
        "Detector ready"
    );
    status
        .update(
            Component::Detector,
            HealthState::Ok,
            format!("Model loaded: {}", detector.model()),
        )
        .await;

    // Transport + dispatch worker
    let telegram = Arc::new(TelegramClient::new(app.telegram_bot_token.clone())?);
    let report = telegram.check_connection(&app.telegram_chat_ids).await;
    let (dispatch, worker) = if report.is_available() {
        let (handle, worker) = dispatch_queue::spawn(telegram.clone(), app.telegram_chat_ids.clone());
        status
            .update(Component::Telegram, HealthState::Ok, "Connected and ready")
            .await;
        (handle, Some(worker))
    } else {
        tracing::warn!("Telegram connection failed, continuing without notifications");
        status
            .update(
                Component::Telegram,
                HealthState::Error,
                "Connection failed - check bot token and chat IDs",
            )
            .await;
        (DispatchHandle::disabled(), None)
    };

    let artifacts = ArtifactStore::open(&data_dir).await?;

    // Frame source
    let mut source: Box<dyn FrameSource> = if app.uses_replay_source() {
        tracing::info!(path = %app.video_file_path, "Developer mode: replaying frames from disk");
        let replay = DirectoryReplaySource::open(&app.video_file_path).await?;
        if args.replay_interval_ms > 0 {
            Box::new(replay.with_frame_interval(Duration::from_millis(args.replay_interval_ms)))
        } else {
            Box::new(replay)
        }
    } else {
        Box::new(RtspStreamSource::new(app.rtsp_url.clone()))
    };
    tracing::info!(source = %source.describe(), "Frame source ready");

    let ctx = AppContext {
        config_store: config_store.clone(),
        detector,
        artifacts,
        dispatch: dispatch.clone(),
        status: status.clone(),
    };

    dispatch.send_message(start_message(&app.camera_name, chrono::Local::now()));
    status
        .update(
            Component::System,
            HealthState::Running,
            "CowCatcher detection system is active",
        )
        .await;

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_reason = Arc::new(std::sync::OnceLock::new());
    {
        let signal_reason = signal_reason.clone();
        tokio::spawn(async move {
            let reason = shutdown_signal().await;
            tracing::info!(reason = reason, "Shutdown requested");
            let _ = signal_reason.set(reason);
            let _ = shutdown_tx.send(true);
        });
    }

    let mut driver = DetectionLoop::new(ctx);
    let exit = driver.run(source.as_mut(), shutdown_rx).await;
    let stats = driver.stats();
    let reason = match exit {
        LoopExit::Shutdown => signal_reason
            .get()
            .copied()
            .unwrap_or("Script stopped (reason unknown)"),
        LoopExit::EndOfStream => "Frame source exhausted",
    };
    tracing::info!(
        frames = stats.frames_read,
        processed = stats.frames_processed,
        notifications = stats.notifications,
        reason = reason,
        "Detection loop finished"
    );

    // Best-effort drain, then the stop message directly through the transport
    if let Some(worker) = worker {
        let joined = worker
            .shutdown(
                &dispatch,
                Duration::from_secs(args.drain_timeout_secs),
                WORKER_JOIN_TIMEOUT,
            )
            .await;
        if !joined {
            tracing::warn!("Proceeding without a clean dispatch worker stop");
        }

        let text = stop_message(
            chrono::Local::now(),
            reason,
            stats.frames_read,
            dispatch.stats().sent(),
            dispatch.stats().failed(),
        );
        let mut delivered = false;
        for chat_id in &app.telegram_chat_ids {
            match telegram.send_message(chat_id, &text).await {
                Ok(()) => delivered = true,
                Err(e) => tracing::error!(chat_id = %chat_id, error = %e, "Error sending stop message"),
            }
        }
        if delivered {
            tracing::info!("Stop message sent to Telegram");
        }
    }

    status
        .update(Component::System, HealthState::Stopped, reason)
        .await;
    tracing::info!("CowCatcher stopped");

    Ok(())
}
