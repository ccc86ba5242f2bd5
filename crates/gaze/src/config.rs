//! Gaze pipeline configuration

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::GazeError;

/// Part of the input image a detector scans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchRegion {
    #[default]
    Full,
    /// Eyes sit in the upper half of a face; the lower half only yields
    /// nostril and mouth-shadow false positives
    UpperHalf,
}

/// Sliding-window cascade detector tuning. Missing fields take the face preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Window growth between scales (> 1.0)
    pub scale_factor: f32,
    /// A cluster needs more than this many raw hits to become a detection
    pub min_neighbors: u32,
    /// Smallest window considered (width, height)
    pub min_size: (u32, u32),
    /// Reject detections narrower/shorter than this fraction of the input image
    pub min_relative_size: f32,
    pub search_region: SearchRegion,
    /// Hard cap on returned detections
    pub max_detections: Option<usize>,
    /// Greedily drop detections overlapping an already accepted one
    pub dedup_overlapping: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::face()
    }
}

impl DetectorConfig {
    /// Camera held close, one user: only a face dominating the frame counts
    pub fn face() -> Self {
        Self {
            scale_factor: 1.05,
            min_neighbors: 3,
            min_size: (30, 30),
            min_relative_size: 0.4,
            search_region: SearchRegion::Full,
            max_detections: None,
            dedup_overlapping: false,
        }
    }

    pub fn eye() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 2,
            min_size: (15, 15),
            min_relative_size: 0.0,
            search_region: SearchRegion::UpperHalf,
            max_detections: Some(2),
            dedup_overlapping: true,
        }
    }

    pub fn validate(&self) -> Result<(), GazeError> {
        if !(self.scale_factor > 1.0) {
            return Err(GazeError::Config(format!(
                "scale_factor must exceed 1.0, got {}",
                self.scale_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.min_relative_size) {
            return Err(GazeError::Config(format!(
                "min_relative_size must be within [0, 1], got {}",
                self.min_relative_size
            )));
        }
        if self.max_detections == Some(0) {
            return Err(GazeError::Config("max_detections must be at least 1".into()));
        }
        Ok(())
    }
}

/// How pupil candidates are pulled out of the eye image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStrategy {
    /// Adaptive threshold, morphology, blob areas
    #[default]
    Blob,
    /// Blur, Otsu threshold, roughly circular regions
    Contour,
}

/// Pupil localizer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PupilConfig {
    /// Top fraction of the eye box dropped before analysis (eyebrows)
    pub eyebrow_fraction: f32,
    /// Mean brightness under which the image counts as low light
    pub low_light_mean: f32,
    pub low_light_clip_limit: f32,
    pub clip_limit: f32,
    /// CLAHE tile grid (tiles per side)
    pub tile_grid: u32,
    /// Adaptive threshold block radius (block side is 2r + 1)
    pub block_radius: u32,
    /// Pixel is foreground when darker than the block mean minus this offset
    pub threshold_offset: i32,
    pub erode_iterations: u8,
    pub dilate_iterations: u8,
    pub median_radius: u32,
    pub min_area: u32,
    pub max_area: u32,
    /// Candidates farther than this from the eye center are eyelid or lash artifacts
    pub max_center_distance: f32,
    pub max_candidates: usize,
    pub strategy: CandidateStrategy,
    /// Contour strategy only
    pub min_circularity: f32,
    /// Contour strategy only
    pub blur_sigma: f32,
}

impl Default for PupilConfig {
    fn default() -> Self {
        Self {
            eyebrow_fraction: 0.25,
            low_light_mean: 50.0,
            low_light_clip_limit: 5.0,
            clip_limit: 1.5,
            tile_grid: 8,
            block_radius: 7,
            threshold_offset: 5,
            erode_iterations: 2,
            dilate_iterations: 4,
            median_radius: 2,
            min_area: 25,
            max_area: 1500,
            max_center_distance: 35.0,
            max_candidates: 2,
            strategy: CandidateStrategy::Blob,
            min_circularity: 0.5,
            blur_sigma: 1.5,
        }
    }
}

impl PupilConfig {
    /// Contour-based extraction with its own area bounds
    pub fn contour() -> Self {
        Self {
            strategy: CandidateStrategy::Contour,
            min_area: 50,
            max_area: 5000,
            ..Default::default()
        }
    }

    /// CLAHE clip limit for an image of the given mean brightness
    pub fn clip_limit_for(&self, mean_brightness: f32) -> f32 {
        if mean_brightness < self.low_light_mean {
            self.low_light_clip_limit
        } else {
            self.clip_limit
        }
    }

    pub fn validate(&self) -> Result<(), GazeError> {
        if !(0.0..1.0).contains(&self.eyebrow_fraction) {
            return Err(GazeError::Config(format!(
                "eyebrow_fraction must be within [0, 1), got {}",
                self.eyebrow_fraction
            )));
        }
        if self.min_area > self.max_area {
            return Err(GazeError::Config(format!(
                "min_area {} exceeds max_area {}",
                self.min_area, self.max_area
            )));
        }
        if self.max_candidates == 0 {
            return Err(GazeError::Config("max_candidates must be at least 1".into()));
        }
        if self.tile_grid == 0 {
            return Err(GazeError::Config("tile_grid must be at least 1".into()));
        }
        if self.strategy == CandidateStrategy::Contour && !(self.blur_sigma > 0.0) {
            return Err(GazeError::Config("blur_sigma must be positive".into()));
        }
        Ok(())
    }
}

/// Complete gaze pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub face: DetectorConfig,
    /// Partial tables are laid over the eye preset, not the face one
    #[serde(deserialize_with = "eye_detector")]
    pub eye: DetectorConfig,
    pub pupil: PupilConfig,
    /// Eye reference line sits at eye height / K below the eye box top
    pub reference_line_divisor: f32,
    /// Cascade model paths
    pub face_cascade_path: Option<String>,
    pub eye_cascade_path: Option<String>,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            face: DetectorConfig::face(),
            eye: DetectorConfig::eye(),
            pupil: PupilConfig::default(),
            reference_line_divisor: 3.4,
            face_cascade_path: None,
            eye_cascade_path: None,
        }
    }
}

fn eye_detector<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DetectorConfig, D::Error> {
    let overrides = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Object(overrides) = overrides else {
        return Err(de::Error::custom("eye detector settings must be a table"));
    };
    let mut merged = match serde_json::to_value(DetectorConfig::eye()).map_err(de::Error::custom)? {
        serde_json::Value::Object(preset) => preset,
        _ => return Err(de::Error::custom("eye preset is not a table")),
    };
    merged.extend(overrides);
    serde_json::from_value(serde_json::Value::Object(merged)).map_err(de::Error::custom)
}

impl GazeConfig {
    pub fn validate(&self) -> Result<(), GazeError> {
        self.face.validate()?;
        self.eye.validate()?;
        self.pupil.validate()?;
        if !(self.reference_line_divisor > 0.0) {
            return Err(GazeError::Config(format!(
                "reference_line_divisor must be positive, got {}",
                self.reference_line_divisor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(GazeConfig::default().validate().is_ok());
        assert!(PupilConfig::contour().validate().is_ok());
    }

    #[test]
    fn test_face_and_eye_presets_differ_only_in_tuning() {
        let face = DetectorConfig::face();
        let eye = DetectorConfig::eye();
        assert_eq!(face.min_relative_size, 0.4);
        assert_eq!(eye.max_detections, Some(2));
        assert_eq!(eye.search_region, SearchRegion::UpperHalf);
        assert!(eye.dedup_overlapping && !face.dedup_overlapping);
    }

    #[test]
    fn test_clip_limit_grows_in_low_light() {
        let pupil = PupilConfig::default();
        assert_eq!(pupil.clip_limit_for(20.0), 5.0);
        assert_eq!(pupil.clip_limit_for(120.0), 1.5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = GazeConfig::default();
        config.face.scale_factor = 1.0;
        assert!(matches!(config.validate(), Err(GazeError::Config(_))));

        let mut config = GazeConfig::default();
        config.pupil.min_area = 5000;
        assert!(config.validate().is_err());

        let config = GazeConfig {
            reference_line_divisor: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: GazeConfig =
            serde_json::from_str(r#"{ "reference_line_divisor": 3.3, "pupil": { "max_center_distance": 20.0 } }"#)
                .unwrap();
        assert_eq!(config.reference_line_divisor, 3.3);
        assert_eq!(config.pupil.max_center_distance, 20.0);
        assert_eq!(config.pupil.max_area, 1500);
        assert_eq!(config.eye, DetectorConfig::eye());
    }

    #[test]
    fn test_partial_detector_tables_keep_their_preset() {
        let config: GazeConfig = serde_json::from_str(
            r#"{ "face": { "min_neighbors": 5 }, "eye": { "scale_factor": 1.2 } }"#,
        )
        .unwrap();
        assert_eq!(config.face.min_neighbors, 5);
        assert_eq!(config.face.min_relative_size, 0.4);
        assert_eq!(config.eye.scale_factor, 1.2);
        assert_eq!(config.eye.max_detections, Some(2));
        assert_eq!(config.eye.search_region, SearchRegion::UpperHalf);
        assert!(config.validate().is_ok());
    }
}
