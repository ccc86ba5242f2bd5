//! Camera Capture Library for the gaze reader
//!
//! Turns raw front-camera frames into analysis-ready images.
//! Supports:
//! - Planar YUV 4:2:0 frames with arbitrary row/pixel strides
//! - Orientation correction (phone front camera, USB webcam)
//! - A push-driven capture thread that drops frames it cannot keep up with

pub mod capture;
pub mod frame;
pub mod normalize;

pub use capture::{CaptureService, CaptureStats, FrameCallback, FrameProcessor};
pub use frame::{Plane, RawFrame, VideoFrame};
pub use normalize::FrameNormalizer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unsupported frame geometry {width}x{height}")]
    UnsupportedGeometry { width: u32, height: u32 },

    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(String),

    #[error("Capture service stopped")]
    Stopped,
}

/// Rotation applied to sensor frames so the pipeline sees an upright portrait image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Phone front camera: sensor is mounted landscape, rotate 90° counter-clockwise
    #[default]
    Rotate90Ccw,
    /// USB webcam: rotate 90° clockwise
    Rotate90Cw,
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Sensor width (before rotation)
    pub width: u32,
    /// Sensor height (before rotation)
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Orientation correction
    pub orientation: Orientation,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            orientation: Orientation::Rotate90Ccw,
        }
    }
}

impl CameraConfig {
    /// Interval between frames at the configured rate
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / self.fps.max(1) as u64)
    }
}
