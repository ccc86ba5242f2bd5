//! Haar cascade model and window evaluation
//!
//! A cascade is a list of boosted stages. Each stage sums decision stumps over
//! Haar-like rectangle features; a window is a hit only if every stage passes.
//! Feature values are variance-normalized so the same model works under
//! different lighting.

use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::GazeError;

/// Rectangle of a Haar feature, in window coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

/// Decision stump: `left` when the feature value is below `threshold * sigma`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature: HaarFeature,
    pub threshold: f32,
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<Stump>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
}

impl HaarCascade {
    /// Load a cascade from a JSON model file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GazeError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| GazeError::CascadeLoad(format!("{}: {}", path.display(), e)))?;
        let cascade = Self::from_json(&json)?;
        info!(
            "Loaded cascade {} ({}x{} window, {} stages)",
            path.display(),
            cascade.window_width,
            cascade.window_height,
            cascade.stages.len()
        );
        Ok(cascade)
    }

    pub fn from_json(json: &str) -> Result<Self, GazeError> {
        let cascade: HaarCascade =
            serde_json::from_str(json).map_err(|e| GazeError::InvalidCascade(e.to_string()))?;
        cascade.validate()?;
        Ok(cascade)
    }

    pub fn validate(&self) -> Result<(), GazeError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(GazeError::InvalidCascade("empty detection window".into()));
        }
        if self.stages.is_empty() {
            return Err(GazeError::InvalidCascade("cascade has no stages".into()));
        }
        for (s, stage) in self.stages.iter().enumerate() {
            if stage.classifiers.is_empty() {
                return Err(GazeError::InvalidCascade(format!("stage {} is empty", s)));
            }
            for stump in &stage.classifiers {
                for r in &stump.feature.rects {
                    if r.width == 0
                        || r.height == 0
                        || r.x + r.width > self.window_width
                        || r.y + r.height > self.window_height
                    {
                        return Err(GazeError::InvalidCascade(format!(
                            "stage {} has a rectangle outside the {}x{} window",
                            s, self.window_width, self.window_height
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Window size at a given scale
    pub fn scaled_window(&self, scale: f32) -> (u32, u32) {
        (
            (self.window_width as f32 * scale).round() as u32,
            (self.window_height as f32 * scale).round() as u32,
        )
    }

    /// Run every stage on the window at (x, y). The window must fit in the image.
    pub(crate) fn evaluate(&self, integral: &IntegralFrame, x: u32, y: u32, scale: f32) -> bool {
        let (ww, wh) = self.scaled_window(scale);
        let area = ww as u128 * wh as u128;
        let sum = integral.sum(x, y, ww, wh) as u128;
        let sq_sum = integral.squared_sum(x, y, ww, wh) as u128;
        // area² · variance, exact so a flat window has exactly zero spread
        let spread = (sq_sum * area).saturating_sub(sum * sum);
        let sigma = if spread > 0 {
            (spread as f64).sqrt() / area as f64
        } else {
            1.0
        };
        let window_area = (self.window_width * self.window_height) as f64;

        self.stages.iter().all(|stage| {
            let score: f32 = stage
                .classifiers
                .iter()
                .map(|stump| {
                    let value = feature_value(&stump.feature, integral, x, y, scale, ww, wh) / window_area;
                    if value < stump.threshold as f64 * sigma {
                        stump.left
                    } else {
                        stump.right
                    }
                })
                .sum();
            score >= stage.threshold
        })
    }
}

/// Weighted rectangle sums in model units.
///
/// Rectangles are rounded to pixels independently at non-integer scales, so
/// each sum is rescaled to the rectangle's unscaled area. This keeps the
/// weights balanced and a flat window at a zero response at every scale.
fn feature_value(
    feature: &HaarFeature,
    integral: &IntegralFrame,
    x: u32,
    y: u32,
    scale: f32,
    ww: u32,
    wh: u32,
) -> f64 {
    feature
        .rects
        .iter()
        .map(|r| {
            let rx = ((r.x as f32 * scale).round() as u32).min(ww - 1);
            let ry = ((r.y as f32 * scale).round() as u32).min(wh - 1);
            let rw = ((r.width as f32 * scale).round() as u32).clamp(1, ww - rx);
            let rh = ((r.height as f32 * scale).round() as u32).clamp(1, wh - ry);
            let model_area = (r.width * r.height) as f64;
            let pixel_area = (rw * rh) as f64;
            r.weight as f64 * integral.sum(x + rx, y + ry, rw, rh) as f64 * model_area / pixel_area
        })
        .sum()
}

/// Summed-area tables of an image and of its squares
pub(crate) struct IntegralFrame {
    sum: ImageBuffer<Luma<u64>, Vec<u64>>,
    squared: ImageBuffer<Luma<u64>, Vec<u64>>,
}

impl IntegralFrame {
    pub fn new(image: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(image),
            squared: integral_squared_image::<_, u64>(image),
        }
    }

    pub fn sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        rect_sum(&self.sum, x, y, width, height)
    }

    pub fn squared_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        rect_sum(&self.squared, x, y, width, height)
    }
}

/// Tables are one pixel larger than the image; entry (x, y) sums everything above and left
fn rect_sum(table: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32, width: u32, height: u32) -> u64 {
    let at = |px: u32, py: u32| table.get_pixel(px, py)[0];
    let (x1, y1) = (x + width, y + height);
    (at(x1, y1) + at(x, y)) - (at(x, y1) + at(x1, y))
}
