//! Gaze Bus
//!
//! Carries gaze samples and presence events from the capture thread to any
//! number of consumers. Each subscriber owns a bounded mailbox that keeps the
//! newest events; publishing never blocks.

mod buffer;
mod bus;

pub use buffer::{LatestRing, DEFAULT_CAPACITY};
pub use bus::{GazeBus, Subscription};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bus error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Bus is closed")]
    Closed,

    #[error("Mailbox capacity must be at least 1")]
    ZeroCapacity,
}

/// One pupil measurement against the eye reference line, in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Vertical pupil position; `UNMEASURED` when no pupil was found
    pub pupil_ordinate: f32,
    /// Vertical position of the eye reference line
    pub eye_line_ordinate: f32,
    /// Whether a pupil was found for this eye
    pub eye_present: bool,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
}

impl GazeSample {
    /// Sentinel ordinate for "not measured this sample"
    pub const UNMEASURED: f32 = 0.0;

    pub fn measured(pupil_ordinate: f32, eye_line_ordinate: f32, timestamp_ns: u64) -> Self {
        Self {
            pupil_ordinate,
            eye_line_ordinate,
            eye_present: true,
            timestamp_ns,
        }
    }

    /// Sample for an eye whose pupil could not be located
    pub fn absent(eye_line_ordinate: f32, timestamp_ns: u64) -> Self {
        Self {
            pupil_ordinate: Self::UNMEASURED,
            eye_line_ordinate,
            eye_present: false,
            timestamp_ns,
        }
    }

    pub fn is_measured(&self) -> bool {
        self.pupil_ordinate != Self::UNMEASURED
    }
}

/// "Gaze detected" indicator update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub detected: bool,
    pub timestamp_ns: u64,
}

/// Everything that travels over the bus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GazeEvent {
    Sample(GazeSample),
    Presence(PresenceEvent),
}

impl GazeEvent {
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            GazeEvent::Sample(s) => s.timestamp_ns,
            GazeEvent::Presence(p) => p.timestamp_ns,
        }
    }
}
