//! Application configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file, then `READER__*` environment variables
//! (`READER__SCROLL__SCREEN_HEIGHT=2400`).

use std::path::{Path, PathBuf};

use camera_capture::CameraConfig;
use ::config::{Config, Environment, File};
use gaze::GazeConfig;
use scroll_control::ScrollConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::ReaderError;

/// Offline replay of image files standing in for the camera
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Directory of upright frames; live capture when unset
    pub directory: Option<PathBuf>,
    /// Push frames at the camera frame rate instead of as fast as possible
    pub realtime: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    /// Events buffered per bus subscriber
    pub bus_capacity: usize,
    pub camera: CameraConfig,
    pub gaze: GazeConfig,
    pub scroll: ScrollConfig,
    pub replay: ReplayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            bus_capacity: gaze_bus::DEFAULT_CAPACITY,
            camera: CameraConfig::default(),
            gaze: GazeConfig::default(),
            scroll: ScrollConfig::default(),
            replay: ReplayConfig {
                directory: None,
                realtime: true,
            },
        }
    }
}

impl AppConfig {
    /// Load defaults, overlay `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ReaderError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("READER").separator("__").try_parsing(true))
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReaderError> {
        if self.bus_capacity == 0 {
            return Err(ReaderError::Config("bus_capacity must be at least 1".into()));
        }
        if self.camera.fps == 0 {
            return Err(ReaderError::Config("camera fps must be at least 1".into()));
        }
        self.scroll.validate()?;
        Ok(())
    }

    /// Log level, INFO when unparseable
    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}
