//! Gaze tracking
//!
//! Frame-by-frame pipeline from an upright camera frame to gaze samples:
//! - Face detection (Haar cascade, dominant face only)
//! - Eye region detection in the upper half of the face
//! - Pupil localization in each eye
//! - Sample and presence publication on the gaze bus

pub mod analysis;
pub mod cascade;
pub mod config;
pub mod detector;
pub mod enhance;
pub mod publish;
pub mod pupil;

pub use analysis::{Absence, EyeObservation, FaceObservation, FrameAnalysis};
pub use cascade::HaarCascade;
pub use config::{CandidateStrategy, DetectorConfig, GazeConfig, PupilConfig, SearchRegion};
pub use detector::{CascadeDetector, Detection, Region};
pub use publish::SamplePublisher;
pub use pupil::{PupilCandidate, PupilLocalizer};

use camera_capture::{FrameProcessor, VideoFrame};
use gaze_bus::GazeBus;
use image::imageops;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info};

/// Gaze error types
#[derive(Error, Debug)]
pub enum GazeError {
    #[error("Cascade loading failed: {0}")]
    CascadeLoad(String),

    #[error("Invalid cascade: {0}")]
    InvalidCascade(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

/// Face, eye and pupil stages. Holds no state between frames.
pub struct GazePipeline {
    face_detector: CascadeDetector,
    eye_detector: CascadeDetector,
    localizer: PupilLocalizer,
}

impl GazePipeline {
    /// Build the pipeline, loading both cascade models from the configured paths
    pub fn new(config: &GazeConfig) -> Result<Self, GazeError> {
        let face_path = config
            .face_cascade_path
            .as_deref()
            .ok_or_else(|| GazeError::CascadeLoad("no face cascade configured".into()))?;
        let eye_path = config
            .eye_cascade_path
            .as_deref()
            .ok_or_else(|| GazeError::CascadeLoad("no eye cascade configured".into()))?;
        Self::with_cascades(HaarCascade::from_path(face_path)?, HaarCascade::from_path(eye_path)?, config)
    }

    pub fn with_cascades(face: HaarCascade, eye: HaarCascade, config: &GazeConfig) -> Result<Self, GazeError> {
        config.validate()?;
        let pipeline = Self {
            face_detector: CascadeDetector::new(face, config.face.clone())?,
            eye_detector: CascadeDetector::new(eye, config.eye.clone())?,
            localizer: PupilLocalizer::new(config.pupil.clone())?,
        };
        info!("Gaze pipeline initialized");
        Ok(pipeline)
    }

    /// Run every detection stage on one frame
    pub fn analyze(&self, frame: &VideoFrame) -> FrameAnalysis {
        let gray = frame.to_grayscale();

        let faces = self
            .face_detector
            .detect(&gray)
            .into_iter()
            .map(|face| {
                let r = face.region;
                let face_image = imageops::crop_imm(&gray, r.x, r.y, r.width, r.height).to_image();
                let eyes = self
                    .eye_detector
                    .detect(&face_image)
                    .into_iter()
                    .map(|eye| {
                        let region = eye.region.offset(r.x, r.y);
                        EyeObservation {
                            region,
                            pupils: self.localizer.localize(&gray, &region),
                        }
                    })
                    .collect();
                FaceObservation { region: r, eyes }
            })
            .collect();

        FrameAnalysis {
            timestamp_ns: frame.timestamp_ns,
            sequence: frame.sequence,
            faces,
        }
    }
}

/// Capture-thread processor: analyze, then publish
pub struct GazeTracker {
    pipeline: GazePipeline,
    publisher: SamplePublisher,
}

impl GazeTracker {
    pub fn new(pipeline: GazePipeline, bus: GazeBus, config: &GazeConfig) -> Self {
        Self {
            pipeline,
            publisher: SamplePublisher::new(bus, config.reference_line_divisor),
        }
    }

    /// Analyze and publish one frame
    pub fn track(&self, frame: &VideoFrame) -> FrameAnalysis {
        let analysis = self.pipeline.analyze(frame);
        counter!("gaze_frames_analyzed_total").increment(1);
        match analysis.absence() {
            Some(absence) => {
                let stage = match absence {
                    Absence::NoFace => "no_face",
                    Absence::NoEyes => "no_eyes",
                    Absence::NoPupil => "no_pupil",
                };
                counter!("gaze_absence_total", "stage" => stage).increment(1);
                debug!("Frame {}: {:?}", frame.sequence, absence);
            }
            None => debug!("Frame {}: {} pupils", frame.sequence, analysis.pupil_count()),
        }
        self.publisher.publish(&analysis);
        analysis
    }
}

impl FrameProcessor for GazeTracker {
    fn process(&mut self, frame: &VideoFrame) {
        self.track(frame);
    }
}
