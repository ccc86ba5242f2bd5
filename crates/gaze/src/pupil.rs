//! Pupil localization inside a detected eye region

use image::{imageops, GrayImage};
use imageproc::contrast::equalize_histogram;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::{CandidateStrategy, PupilConfig};
use crate::detector::Region;
use crate::enhance::{
    adaptive_threshold_inv, clahe, clean_speckle, foreground_blobs, mean_brightness, otsu_inverted, Blob,
};
use crate::GazeError;

/// Pupil center found in an eye region
///
/// `x`/`y` are relative to the analysed part of the eye: the eye region's
/// top-left corner shifted down by `eyebrow_cut`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PupilCandidate {
    pub x: f32,
    pub y: f32,
    /// Equivalent blob diameter
    pub size: f32,
    /// Eye region the candidate was found in (frame coordinates)
    pub eye: Region,
    /// Rows dropped from the top of the eye region before analysis
    pub eyebrow_cut: u32,
}

impl PupilCandidate {
    /// Euclidean distance to the eye region's geometric center
    pub fn distance_to_eye_center(&self) -> f32 {
        let (cx, cy) = eye_center_in_crop(&self.eye, self.eyebrow_cut);
        ((self.x - cx).powi(2) + (self.y - cy).powi(2)).sqrt()
    }

    /// Position in frame coordinates
    pub fn frame_position(&self) -> (f32, f32) {
        (
            self.eye.x as f32 + self.x,
            (self.eye.y + self.eyebrow_cut) as f32 + self.y,
        )
    }
}

fn eye_center_in_crop(eye: &Region, eyebrow_cut: u32) -> (f32, f32) {
    (eye.width as f32 / 2.0, eye.height as f32 / 2.0 - eyebrow_cut as f32)
}

/// Finds dark, compact, centered blobs in an eye image
pub struct PupilLocalizer {
    config: PupilConfig,
}

impl PupilLocalizer {
    pub fn new(config: PupilConfig) -> Result<Self, GazeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PupilConfig {
        &self.config
    }

    /// Locate up to `max_candidates` pupils, largest first. `eye` is in `frame` coordinates.
    pub fn localize(&self, frame: &GrayImage, eye: &Region) -> Vec<PupilCandidate> {
        let Some(eye) = eye.clamp_to(frame.width(), frame.height()) else {
            return Vec::new();
        };
        let eyebrow_cut = (eye.height as f32 * self.config.eyebrow_fraction) as u32;
        let crop_height = eye.height - eyebrow_cut;
        if crop_height == 0 {
            return Vec::new();
        }
        let crop = imageops::crop_imm(frame, eye.x, eye.y + eyebrow_cut, eye.width, crop_height).to_image();

        let enhanced = self.enhance(&crop);
        let mask = match self.config.strategy {
            CandidateStrategy::Blob => clean_speckle(
                &adaptive_threshold_inv(&enhanced, self.config.block_radius, self.config.threshold_offset),
                self.config.erode_iterations,
                self.config.dilate_iterations,
                self.config.median_radius,
            ),
            CandidateStrategy::Contour => otsu_inverted(&enhanced, self.config.blur_sigma),
        };

        let (cx, cy) = eye_center_in_crop(&eye, eyebrow_cut);
        let mut blobs: Vec<Blob> = foreground_blobs(&mask)
            .into_iter()
            .filter(|b| (self.config.min_area..=self.config.max_area).contains(&b.area))
            .filter(|b| {
                self.config.strategy != CandidateStrategy::Contour
                    || b.circularity() > self.config.min_circularity
            })
            .filter(|b| ((b.cx - cx).powi(2) + (b.cy - cy).powi(2)).sqrt() <= self.config.max_center_distance)
            .collect();

        // Stable: equal areas keep raster order
        blobs.sort_by(|a, b| b.area.cmp(&a.area));
        blobs.truncate(self.config.max_candidates);

        trace!("{} pupil candidates in eye {:?}", blobs.len(), eye);

        blobs
            .into_iter()
            .map(|b| PupilCandidate {
                x: b.cx,
                y: b.cy,
                size: 2.0 * b.radius(),
                eye,
                eyebrow_cut,
            })
            .collect()
    }

    /// Global equalization followed by CLAHE, stronger in low light
    fn enhance(&self, crop: &GrayImage) -> GrayImage {
        let clip = self.config.clip_limit_for(mean_brightness(crop));
        clahe(&equalize_histogram(crop), clip, self.config.tile_grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Light skin-toned frame with a dark pupil disk at (px, py)
    fn eye_frame(width: u32, height: u32, px: f32, py: f32, radius: f32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let d = ((x as f32 - px).powi(2) + (y as f32 - py).powi(2)).sqrt();
            Luma([if d <= radius { 15 } else { 190 }])
        })
    }

    #[test]
    fn test_centered_pupil_found() {
        let frame = eye_frame(80, 60, 40.0, 34.0, 7.0);
        let localizer = PupilLocalizer::new(PupilConfig::default()).unwrap();
        let eye = Region::new(10, 10, 60, 44);

        let pupils = localizer.localize(&frame, &eye);
        assert_eq!(pupils.len(), 1);
        let (fx, fy) = pupils[0].frame_position();
        assert!((fx - 40.0).abs() < 1.5, "x = {}", fx);
        assert!((fy - 34.0).abs() < 1.5, "y = {}", fy);
        assert_eq!(pupils[0].eyebrow_cut, 11);
        assert!(pupils[0].distance_to_eye_center() <= 35.0);
    }

    #[test]
    fn test_ordinate_is_relative_to_cut_region() {
        let frame = eye_frame(80, 60, 40.0, 34.0, 7.0);
        let localizer = PupilLocalizer::new(PupilConfig::default()).unwrap();
        let pupils = localizer.localize(&frame, &Region::new(10, 10, 60, 44));
        // 34 - eye top 10 - eyebrow band 11
        assert!((pupils[0].y - 13.0).abs() < 1.5);
    }

    #[test]
    fn test_far_from_center_rejected() {
        let frame = eye_frame(120, 60, 12.0, 30.0, 6.0);
        let config = PupilConfig {
            max_center_distance: 20.0,
            ..Default::default()
        };
        let localizer = PupilLocalizer::new(config).unwrap();
        assert!(localizer.localize(&frame, &Region::new(0, 0, 120, 60)).is_empty());
    }

    #[test]
    fn test_uniform_eye_has_no_pupil() {
        let frame = GrayImage::from_pixel(60, 40, Luma([150]));
        let localizer = PupilLocalizer::new(PupilConfig::default()).unwrap();
        assert!(localizer.localize(&frame, &Region::new(0, 0, 60, 40)).is_empty());
    }

    #[test]
    fn test_eyebrow_band_is_ignored() {
        // Dark bar across the top quarter only
        let frame = GrayImage::from_fn(60, 40, |_, y| Luma([if y < 8 { 10 } else { 190 }]));
        let localizer = PupilLocalizer::new(PupilConfig::default()).unwrap();
        assert!(localizer.localize(&frame, &Region::new(0, 0, 60, 40)).is_empty());
    }

    #[test]
    fn test_contour_strategy_finds_round_pupil() {
        let frame = eye_frame(80, 60, 40.0, 32.0, 7.0);
        let localizer = PupilLocalizer::new(PupilConfig::contour()).unwrap();
        let pupils = localizer.localize(&frame, &Region::new(10, 10, 60, 44));
        assert_eq!(pupils.len(), 1);
        assert!(pupils[0].size > 10.0);
    }

    #[test]
    fn test_candidates_capped_and_sorted() {
        let frame = GrayImage::from_fn(80, 60, |x, y| {
            let d1 = ((x as f32 - 30.0).powi(2) + (y as f32 - 35.0).powi(2)).sqrt();
            let d2 = ((x as f32 - 50.0).powi(2) + (y as f32 - 35.0).powi(2)).sqrt();
            let d3 = ((x as f32 - 40.0).powi(2) + (y as f32 - 50.0).powi(2)).sqrt();
            Luma([if d1 <= 4.0 || d2 <= 6.0 || d3 <= 5.0 { 15 } else { 190 }])
        });
        let config = PupilConfig {
            erode_iterations: 1,
            dilate_iterations: 1,
            median_radius: 1,
            ..Default::default()
        };
        let localizer = PupilLocalizer::new(config).unwrap();
        let pupils = localizer.localize(&frame, &Region::new(0, 0, 80, 60));
        assert!(pupils.len() <= 2);
        assert!(pupils.windows(2).all(|w| w[0].size >= w[1].size));
    }

    #[test]
    fn test_eye_outside_frame() {
        let frame = GrayImage::from_pixel(20, 20, Luma([100]));
        let localizer = PupilLocalizer::new(PupilConfig::default()).unwrap();
        assert!(localizer.localize(&frame, &Region::new(30, 30, 10, 10)).is_empty());
    }
}
