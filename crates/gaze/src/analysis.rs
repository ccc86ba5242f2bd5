//! Per-frame detection results

use serde::{Deserialize, Serialize};

use crate::detector::Region;
use crate::pupil::PupilCandidate;

/// Stage at which a frame stopped yielding detections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Absence {
    /// No face large enough to be the reader
    NoFace,
    /// Faces found, but no eye in any of them
    NoEyes,
    /// Eyes found, but no pupil in any of them
    NoPupil,
}

/// One eye region and the pupils located in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeObservation {
    /// Frame coordinates
    pub region: Region,
    /// Largest first, at most two
    pub pupils: Vec<PupilCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Frame coordinates
    pub region: Region,
    pub eyes: Vec<EyeObservation>,
}

/// Complete result for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub timestamp_ns: u64,
    pub sequence: u32,
    pub faces: Vec<FaceObservation>,
}

impl FrameAnalysis {
    pub fn face_detected(&self) -> bool {
        !self.faces.is_empty()
    }

    /// Every eye across all faces
    pub fn eyes(&self) -> impl Iterator<Item = &EyeObservation> {
        self.faces.iter().flat_map(|f| f.eyes.iter())
    }

    pub fn pupil_count(&self) -> usize {
        self.eyes().map(|e| e.pupils.len()).sum()
    }

    /// Earliest stage that came up empty, `None` if at least one pupil was found
    pub fn absence(&self) -> Option<Absence> {
        if self.faces.is_empty() {
            Some(Absence::NoFace)
        } else if self.eyes().next().is_none() {
            Some(Absence::NoEyes)
        } else if self.pupil_count() == 0 {
            Some(Absence::NoPupil)
        } else {
            None
        }
    }
}
