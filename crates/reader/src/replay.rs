//! Offline frame replay
//!
//! Reads upright images from a directory, turns each into the planar
//! landscape frame the sensor would have produced and pushes it through
//! the capture callback.

use std::path::{Path, PathBuf};
use std::time::Duration;

use camera_capture::{FrameCallback, Orientation, RawFrame};
use image::{imageops, ImageFormat, RgbImage};
use tracing::{info, warn};

use crate::ReaderError;

pub struct ReplayDriver {
    frames: Vec<PathBuf>,
    orientation: Orientation,
    pacing: Duration,
}

impl ReplayDriver {
    /// Collect image files in `dir`, sorted by name
    pub fn from_dir(dir: impl AsRef<Path>, orientation: Orientation, pacing: Duration) -> Result<Self, ReaderError> {
        let dir = dir.as_ref();
        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
            .collect();
        frames.sort();
        info!("Replaying {} frames from {}", frames.len(), dir.display());
        Ok(Self {
            frames,
            orientation,
            pacing,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Decode `path` and undo the normalizer's rotation
    pub fn load_frame(&self, path: &Path, sequence: u32) -> Result<RawFrame, ReaderError> {
        let upright = image::open(path)?.to_rgb8();
        let sensor = to_sensor(&upright, self.orientation);
        let timestamp_ns = self.pacing.as_nanos() as u64 * sequence as u64;
        Ok(RawFrame::from_rgb(&sensor, timestamp_ns, sequence))
    }

    /// Push every frame through `callback`; unreadable files are skipped
    pub async fn run(&self, callback: &FrameCallback) -> Result<usize, ReaderError> {
        let mut pushed = 0;
        for (sequence, path) in self.frames.iter().enumerate() {
            let frame = match self.load_frame(path, sequence as u32) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            callback.on_frame(frame)?;
            pushed += 1;
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }
        Ok(pushed)
    }
}

fn to_sensor(upright: &RgbImage, orientation: Orientation) -> RgbImage {
    match orientation {
        Orientation::Rotate90Ccw => imageops::rotate90(upright),
        Orientation::Rotate90Cw => imageops::rotate270(upright),
    }
}
