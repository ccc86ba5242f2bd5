//! Push-driven capture thread
//!
//! The camera delivers frames through a callback. Frames land in a single
//! slot; the capture thread takes the newest one, normalizes it and runs the
//! processor. A frame arriving while the previous one is still being
//! processed replaces whatever is pending, so the pipeline never queues.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use crate::frame::{RawFrame, VideoFrame};
use crate::normalize::FrameNormalizer;
use crate::{CameraConfig, CaptureError};

/// Work run on the capture thread for every normalized frame
pub trait FrameProcessor: Send + 'static {
    fn process(&mut self, frame: &VideoFrame);
}

impl<F> FrameProcessor for F
where
    F: FnMut(&VideoFrame) + Send + 'static,
{
    fn process(&mut self, frame: &VideoFrame) {
        self(frame)
    }
}

/// Capture statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub received: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub processed: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    processed: AtomicU64,
}

struct Shared {
    slot: Mutex<Option<RawFrame>>,
    ready: Condvar,
    shutdown: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn stats(&self) -> CaptureStats {
        CaptureStats {
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
        }
    }
}

/// Handle given to the camera subsystem; cheap to clone
#[derive(Clone)]
pub struct FrameCallback {
    shared: Arc<Shared>,
}

impl FrameCallback {
    /// Hand a new frame to the capture thread. Never blocks on processing.
    pub fn on_frame(&self, frame: RawFrame) -> Result<(), CaptureError> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(CaptureError::Stopped);
        }

        self.shared.counters.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("capture_frames_received_total").increment(1);

        let replaced = {
            let mut slot = self
                .shared
                .slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.replace(frame)
        };

        if let Some(stale) = replaced {
            debug!("Dropping frame {} (capture thread busy)", stale.sequence);
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("capture_frames_dropped_total").increment(1);
        }

        self.shared.ready.notify_one();
        Ok(())
    }
}

/// Dedicated capture/processing thread
pub struct CaptureService {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureService {
    /// Spawn the capture thread
    pub fn spawn<P: FrameProcessor>(config: &CameraConfig, processor: P) -> Result<Self, CaptureError> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
            counters: Counters::default(),
        });

        let normalizer = FrameNormalizer::new(config.orientation);
        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("gaze-capture".into())
            .spawn(move || run_loop(thread_shared, normalizer, processor))
            .map_err(|e| CaptureError::ThreadSpawn(e.to_string()))?;

        info!(
            "Capture thread started ({}x{} @ {}fps, {:?})",
            config.width, config.height, config.fps, config.orientation
        );

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Callback for the camera subsystem
    pub fn callback(&self) -> FrameCallback {
        FrameCallback {
            shared: self.shared.clone(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.stats()
    }

    /// Stop the thread after the frame in flight (if any) completes.
    /// A pending, unprocessed frame is discarded.
    pub fn stop(mut self) -> CaptureStats {
        self.shutdown();
        self.shared.stats()
    }

    fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.ready.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Capture thread panicked");
            }
            info!("Capture thread stopped");
        }
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<P: FrameProcessor>(shared: Arc<Shared>, mut normalizer: FrameNormalizer, mut processor: P) {
    loop {
        let frame = {
            let mut slot = shared
                .slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(frame) = slot.take() {
                    break frame;
                }
                slot = shared
                    .ready
                    .wait(slot)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        match normalizer.normalize(&frame) {
            Ok(video) => {
                processor.process(video);
                shared.counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Dropping frame {}: {}", frame.sequence, e);
                shared.counters.malformed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("capture_frames_malformed_total").increment(1);
            }
        }
    }
}
