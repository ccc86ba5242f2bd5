//! Raw sensor frames and decoded video frames

use image::{GrayImage, Rgb, RgbImage};

use crate::CaptureError;

/// One plane of a planar sensor frame
#[derive(Debug, Clone)]
pub struct Plane {
    /// Plane bytes, possibly padded at row ends or interleaved with another plane
    pub data: Vec<u8>,
    /// Distance in bytes between the starts of two consecutive rows
    pub row_stride: usize,
    /// Distance in bytes between two consecutive samples of a row
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Tightly packed plane (pixel stride 1, no row padding)
    pub fn packed(data: Vec<u8>, cols: usize) -> Self {
        Self::new(data, cols, 1)
    }

    /// Check that `cols x rows` samples can be addressed without over-reading
    /// and without rows aliasing each other.
    fn validate(&self, name: &str, cols: usize, rows: usize) -> Result<(), CaptureError> {
        if self.pixel_stride == 0 || self.row_stride == 0 {
            return Err(CaptureError::MalformedFrame(format!(
                "{} plane has zero stride (row {}, pixel {})",
                name, self.row_stride, self.pixel_stride
            )));
        }

        let row_span = (cols - 1)
            .checked_mul(self.pixel_stride)
            .and_then(|v| v.checked_add(1))
            .ok_or_else(|| CaptureError::MalformedFrame(format!("{} plane stride overflow", name)))?;

        if self.row_stride < row_span {
            return Err(CaptureError::MalformedFrame(format!(
                "{} plane row stride {} shorter than row span {}",
                name, self.row_stride, row_span
            )));
        }

        let required = (rows - 1)
            .checked_mul(self.row_stride)
            .and_then(|v| v.checked_add(row_span))
            .ok_or_else(|| CaptureError::MalformedFrame(format!("{} plane size overflow", name)))?;

        if self.data.len() < required {
            return Err(CaptureError::MalformedFrame(format!(
                "{} plane holds {} bytes, {} required",
                name,
                self.data.len(),
                required
            )));
        }

        Ok(())
    }

    #[inline]
    fn sample(&self, col: usize, row: usize) -> u8 {
        self.data[row * self.row_stride + col * self.pixel_stride]
    }
}

/// Raw YUV 4:2:0 frame as delivered by the camera, in sensor orientation
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl RawFrame {
    /// Chroma plane dimensions (columns, rows)
    pub fn chroma_dims(&self) -> (usize, usize) {
        (
            (self.width as usize + 1) / 2,
            (self.height as usize + 1) / 2,
        )
    }

    /// Validate plane geometry against the declared dimensions
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::UnsupportedGeometry {
                width: self.width,
                height: self.height,
            });
        }

        let (cw, ch) = self.chroma_dims();
        self.y
            .validate("Y", self.width as usize, self.height as usize)?;
        self.u.validate("U", cw, ch)?;
        self.v.validate("V", cw, ch)?;
        Ok(())
    }

    /// Read the (Y, U, V) triple for a sensor pixel. Geometry must be validated first.
    #[inline]
    pub(crate) fn yuv_at(&self, x: usize, y: usize) -> (u8, u8, u8) {
        (
            self.y.sample(x, y),
            self.u.sample(x / 2, y / 2),
            self.v.sample(x / 2, y / 2),
        )
    }

    /// Encode an RGB image into a tightly packed I420 frame.
    ///
    /// Used by the replay driver and by tests to synthesize sensor input.
    pub fn from_rgb(image: &RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);

        let mut y_plane = Vec::with_capacity(w * h);
        for pixel in image.pixels() {
            let [r, g, b] = pixel.0.map(f32::from);
            y_plane.push((0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8);
        }

        let mut u_plane = Vec::with_capacity(cw * ch);
        let mut v_plane = Vec::with_capacity(cw * ch);
        for cy in 0..ch {
            for cx in 0..cw {
                let (mut r, mut g, mut b, mut n) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
                for dy in 0..2 {
                    for dx in 0..2 {
                        let (px, py) = (cx * 2 + dx, cy * 2 + dy);
                        if px < w && py < h {
                            let p = image.get_pixel(px as u32, py as u32);
                            r += p[0] as f32;
                            g += p[1] as f32;
                            b += p[2] as f32;
                            n += 1.0;
                        }
                    }
                }
                let (r, g, b) = (r / n, g / n, b / n);
                let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
                let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
                u_plane.push(u.round().clamp(0.0, 255.0) as u8);
                v_plane.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }

        Self {
            width,
            height,
            y: Plane::packed(y_plane, w),
            u: Plane::packed(u_plane, cw),
            v: Plane::packed(v_plane, cw),
            timestamp_ns,
            sequence,
        }
    }
}

/// Decoded, upright RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixels
    pub image: RgbImage,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from an RGB image
    pub fn new(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            image,
            timestamp_ns,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.image.get_pixel_checked(x, y).map(|p: &Rgb<u8>| p.0)
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> RawFrame {
        RawFrame::from_rgb(&RgbImage::from_pixel(width, height, Rgb([90, 90, 90])), 0, 0)
    }

    #[test]
    fn test_packed_frame_validates() {
        assert!(gray_frame(8, 6).validate().is_ok());
        assert!(gray_frame(7, 5).validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut frame = gray_frame(4, 4);
        frame.width = 0;
        assert!(matches!(
            frame.validate(),
            Err(CaptureError::UnsupportedGeometry { .. })
        ));
    }

    #[test]
    fn test_short_plane_rejected() {
        let mut frame = gray_frame(8, 8);
        frame.y.data.truncate(60);
        assert!(matches!(frame.validate(), Err(CaptureError::MalformedFrame(_))));
    }

    #[test]
    fn test_zero_stride_rejected() {
        let mut frame = gray_frame(8, 8);
        frame.u.pixel_stride = 0;
        assert!(matches!(frame.validate(), Err(CaptureError::MalformedFrame(_))));
    }

    #[test]
    fn test_row_stride_shorter_than_row_rejected() {
        let mut frame = gray_frame(8, 8);
        frame.v.pixel_stride = 2;
        // 4 chroma columns at pixel stride 2 span 7 bytes, row stride is still 4
        assert!(matches!(frame.validate(), Err(CaptureError::MalformedFrame(_))));
    }

    #[test]
    fn test_from_rgb_gray_is_neutral_chroma() {
        let frame = gray_frame(6, 4);
        assert!(frame.y.data.iter().all(|&v| v == 90));
        assert!(frame.u.data.iter().all(|&v| v == 128));
        assert!(frame.v.data.iter().all(|&v| v == 128));
        assert_eq!(frame.chroma_dims(), (3, 2));
    }

    #[test]
    fn test_video_frame_pixel_access() {
        let frame = VideoFrame::new(RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])), 10, 1);
        assert_eq!(frame.get_pixel(2, 1), Some([1, 2, 3]));
        assert_eq!(frame.get_pixel(3, 0), None);
        assert_eq!(frame.to_grayscale().dimensions(), (3, 2));
    }
}
