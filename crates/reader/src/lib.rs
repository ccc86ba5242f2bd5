//! Gaze Reader
//!
//! Host for the gaze-scrolling pipeline: wires the capture thread, gaze
//! pipeline, bus and reading session together and drives them from a
//! directory of frames.

mod config;
mod replay;
mod view;

pub use config::{AppConfig, ReplayConfig};
pub use replay::ReplayDriver;
pub use view::{LoggingDocumentView, LoggingIndicator};

use std::time::Duration;

use camera_capture::{CaptureError, CaptureService, CaptureStats};
use gaze::{GazePipeline, GazeTracker};
use gaze_bus::{BusError, GazeBus};
use scroll_control::{ReadingSession, ScrollError, SessionStats};
use thiserror::Error;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Reader error types
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Scroll error: {0}")]
    Scroll(#[from] ScrollError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Initialize logging
pub fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// False when the cascades could not be loaded
    pub tracking_enabled: bool,
    pub frames_pushed: usize,
    pub capture: CaptureStats,
    pub session: SessionStats,
    pub scroll_offset: f32,
    pub relayouts: u64,
}

/// Run one reading session until replay finishes, or until Ctrl-C without a replay directory
pub async fn run(config: AppConfig) -> Result<RunSummary, ReaderError> {
    let bus = GazeBus::new(config.bus_capacity)?;
    let mut session = ReadingSession::open(
        &bus,
        config.scroll.clone(),
        LoggingDocumentView::default(),
        LoggingIndicator::default(),
    )?;

    let pipeline = match GazePipeline::new(&config.gaze) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Gaze tracking disabled: {}", e);
            session.close();
            return Ok(RunSummary::default());
        }
    };
    let tracker = GazeTracker::new(pipeline, bus.clone(), &config.gaze);
    let capture = CaptureService::spawn(&config.camera, tracker)?;

    let pacing = if config.replay.realtime {
        config.camera.frame_interval()
    } else {
        Duration::ZERO
    };

    let feed = async {
        let pushed = async {
            match &config.replay.directory {
                Some(dir) => {
                    let driver = ReplayDriver::from_dir(dir, config.camera.orientation, pacing)?;
                    let pushed = driver.run(&capture.callback()).await?;
                    wait_for_idle(&capture).await;
                    Ok(pushed)
                }
                None => {
                    info!("No replay directory configured; waiting for Ctrl-C");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Ctrl-C handler failed: {}", e);
                    }
                    Ok::<usize, ReaderError>(0)
                }
            }
        }
        .await;
        // Ends the session loop once buffered events are consumed
        bus.close();
        pushed
    };

    let (pushed, stats) = tokio::join!(feed, session.run(std::future::pending()));
    let capture_stats = capture.stop();
    let (pushed, session_stats) = (pushed?, stats?);

    let (view, _indicator) = session.into_parts();
    info!(
        "Session finished: {} frames pushed, {} processed, {} scroll commands, offset {:.1}",
        pushed, capture_stats.processed, session_stats.commands, view.offset()
    );

    Ok(RunSummary {
        tracking_enabled: true,
        frames_pushed: pushed,
        capture: capture_stats,
        session: session_stats,
        scroll_offset: view.offset(),
        relayouts: view.relayouts(),
    })
}

/// Wait until every pushed frame was processed or dropped
async fn wait_for_idle(capture: &CaptureService) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let stats = capture.stats();
        if stats.processed + stats.dropped + stats.malformed >= stats.received {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("Capture thread still busy after replay");
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
