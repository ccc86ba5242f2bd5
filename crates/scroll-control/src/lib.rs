//! Scroll Control
//!
//! Turns gaze samples into document scroll commands:
//! - Pupil sentinel fallback and eye-line smoothing across samples
//! - Screen-relative dead zone suppressing measurement jitter
//! - Reading session loop feeding a document view and a presence indicator

mod controller;
mod session;

pub use controller::{DeadZone, ScrollCommand, ScrollConfig, ScrollController, ScrollState, TrackingState};
pub use session::{DocumentView, PresenceIndicator, ReadingSession, SessionStats};

use gaze_bus::BusError;
use thiserror::Error;

/// Scroll control error types
#[derive(Error, Debug)]
pub enum ScrollError {
    #[error("Invalid screen height: {0}")]
    InvalidScreenHeight(f32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No reading session is open")]
    SessionNotOpen,

    #[error("Gaze bus error: {0}")]
    Bus(#[from] BusError),
}
