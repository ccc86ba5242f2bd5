//! Dead-zone scroll controller

use gaze_bus::GazeSample;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::ScrollError;

/// Scroll control configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Display height in pixels
    pub screen_height: f32,
    /// Lower dead-zone bound is `screen_height / lower_divisor` (negative)
    pub lower_divisor: f32,
    /// Upper dead-zone bound is `screen_height / upper_divisor` (positive)
    pub upper_divisor: f32,
    /// Displacement per pixel of gaze delta. Negative: a pupil above the
    /// reference line pulls the content down.
    pub sensitivity: f32,
    /// Average the eye line with the previous one
    pub smooth_eye_line: bool,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            screen_height: 1920.0,
            lower_divisor: -564.7,
            upper_divisor: 768.0,
            sensitivity: -2.0,
            smooth_eye_line: true,
        }
    }
}

impl ScrollConfig {
    pub fn for_screen(screen_height: f32) -> Self {
        Self {
            screen_height,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ScrollError> {
        if !(self.screen_height.is_finite() && self.screen_height > 0.0) {
            return Err(ScrollError::InvalidScreenHeight(self.screen_height));
        }
        if !(self.lower_divisor < 0.0) || !(self.upper_divisor > 0.0) {
            return Err(ScrollError::Config(format!(
                "dead-zone divisors must be negative/positive, got {}/{}",
                self.lower_divisor, self.upper_divisor
            )));
        }
        if !self.sensitivity.is_finite() {
            return Err(ScrollError::Config(format!("sensitivity must be finite, got {}", self.sensitivity)));
        }
        Ok(())
    }
}

/// Band of gaze deltas treated as noise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadZone {
    pub lower: f32,
    pub upper: f32,
}

impl DeadZone {
    pub fn for_config(config: &ScrollConfig) -> Self {
        Self {
            lower: config.screen_height / config.lower_divisor,
            upper: config.screen_height / config.upper_divisor,
        }
    }

    pub fn contains(&self, delta: f32) -> bool {
        (self.lower..=self.upper).contains(&delta)
    }
}

/// Smoothing state carried between samples of one session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollState {
    pub previous_pupil_ordinate: f32,
    pub previous_eye_line_ordinate: f32,
}

impl ScrollState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Relative scroll to apply to the document view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollCommand {
    pub displacement: f32,
    /// Page cache is keyed by visible offset and must be rebuilt
    pub relayout: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking,
}

/// Session state machine and control law
pub struct ScrollController {
    config: ScrollConfig,
    dead_zone: DeadZone,
    state: ScrollState,
    tracking: TrackingState,
}

impl ScrollController {
    pub fn new(config: ScrollConfig) -> Result<Self, ScrollError> {
        config.validate()?;
        let dead_zone = DeadZone::for_config(&config);
        info!(
            "Scroll controller for {}px screen, dead zone [{:.2}, {:.2}], sensitivity {}",
            config.screen_height, dead_zone.lower, dead_zone.upper, config.sensitivity
        );
        Ok(Self {
            config,
            dead_zone,
            state: ScrollState::default(),
            tracking: TrackingState::Idle,
        })
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    pub fn dead_zone(&self) -> DeadZone {
        self.dead_zone
    }

    pub fn state(&self) -> &ScrollState {
        &self.state
    }

    pub fn tracking_state(&self) -> TrackingState {
        self.tracking
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking == TrackingState::Tracking
    }

    /// Start a session with fresh smoothing state
    pub fn open_session(&mut self) {
        self.state.reset();
        self.tracking = TrackingState::Tracking;
        info!("Reading session opened");
    }

    pub fn close_session(&mut self) {
        self.state.reset();
        if self.tracking == TrackingState::Tracking {
            info!("Reading session closed");
        }
        self.tracking = TrackingState::Idle;
    }

    /// Feed one sample, returning the scroll to apply if any
    pub fn on_sample(&mut self, sample: &GazeSample) -> Result<Option<ScrollCommand>, ScrollError> {
        if self.tracking != TrackingState::Tracking {
            return Err(ScrollError::SessionNotOpen);
        }
        // An eye without a pupil goes through the sentinel fallback but never
        // updates the smoothing state
        let measured = sample.eye_present && sample.is_measured();
        let pupil = if measured {
            self.state.previous_pupil_ordinate = sample.pupil_ordinate;
            sample.pupil_ordinate
        } else {
            self.state.previous_pupil_ordinate
        };

        let previous_eye_line = self.state.previous_eye_line_ordinate;
        let eye_line = if !self.config.smooth_eye_line || previous_eye_line == 0.0 {
            sample.eye_line_ordinate
        } else if measured {
            (sample.eye_line_ordinate + previous_eye_line) / 2.0
        } else {
            previous_eye_line
        };
        if sample.eye_present {
            self.state.previous_eye_line_ordinate = eye_line;
        }

        if pupil == GazeSample::UNMEASURED {
            debug!("No pupil measured yet in this session");
            return Ok(None);
        }

        let delta = eye_line - pupil;
        if self.dead_zone.contains(delta) {
            trace!("Delta {:.2} inside dead zone", delta);
            return Ok(None);
        }

        counter!("scroll_commands_total").increment(1);
        let command = ScrollCommand {
            displacement: delta * self.config.sensitivity,
            relayout: true,
        };
        debug!("Delta {:.2} -> scroll {:.2}", delta, command.displacement);
        Ok(Some(command))
    }
}
