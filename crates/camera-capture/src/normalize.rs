//! Frame normalization: stride-aware YUV 4:2:0 to RGB with orientation correction

use image::{Rgb, RgbImage};

use crate::frame::{RawFrame, VideoFrame};
use crate::{CaptureError, Orientation};

/// Converts raw sensor frames into upright RGB frames.
///
/// Owns a single output buffer that is reused for every frame of the same
/// geometry, so steady-state normalization does not allocate.
pub struct FrameNormalizer {
    orientation: Orientation,
    output: VideoFrame,
}

impl FrameNormalizer {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            output: VideoFrame::new(RgbImage::new(0, 0), 0, 0),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Normalize a raw frame.
    ///
    /// The output is `height x width` of the sensor frame (rotated 90°).
    /// Malformed plane geometry is reported and the frame must be dropped.
    pub fn normalize(&mut self, raw: &RawFrame) -> Result<&VideoFrame, CaptureError> {
        raw.validate()?;

        let (w, h) = (raw.width, raw.height);
        if self.output.image.dimensions() != (h, w) {
            self.output.image = RgbImage::new(h, w);
        }

        for y in 0..h {
            for x in 0..w {
                let (luma, u, v) = raw.yuv_at(x as usize, y as usize);
                let (dx, dy) = match self.orientation {
                    Orientation::Rotate90Ccw => (y, w - 1 - x),
                    Orientation::Rotate90Cw => (h - 1 - y, x),
                };
                self.output.image.put_pixel(dx, dy, yuv_to_rgb(luma, u, v));
            }
        }

        self.output.timestamp_ns = raw.timestamp_ns;
        self.output.sequence = raw.sequence;
        Ok(&self.output)
    }
}

/// Full-range BT.601 conversion
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)])
}

#[inline]
fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
