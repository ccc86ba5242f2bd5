//! Grayscale enhancement and binarization steps used by the pupil localizer

use std::f32::consts::PI;

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::cascade::IntegralFrame;

/// Connected foreground region of a binary mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub area: u32,
    /// Centroid, in pixel indices
    pub cx: f32,
    pub cy: f32,
    /// Pixels on the region boundary
    pub perimeter: u32,
}

impl Blob {
    /// Radius of the disk with the same area
    pub fn radius(&self) -> f32 {
        (self.area as f32 / PI).sqrt()
    }

    /// 4πA/P² with P counted in boundary pixels: near or above 1 for compact
    /// regions, well under 0.5 for strokes
    pub fn circularity(&self) -> f32 {
        if self.perimeter == 0 {
            return 0.0;
        }
        4.0 * PI * self.area as f32 / (self.perimeter as f32).powi(2)
    }
}

pub fn mean_brightness(image: &GrayImage) -> f32 {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = image.pixels().map(|p| p[0] as u64).sum();
    sum as f32 / count as f32
}

/// Contrast-limited adaptive histogram equalization over a `grid` x `grid`
/// tiling, bilinearly blending neighbouring tile mappings
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let grid = grid.max(1);
    let tile_w = width.div_ceil(grid);
    let tile_h = height.div_ceil(grid);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(width), (y0 + tile_h).min(height));
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            luts.push(clipped_lut(&mut hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let lut = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let locate = |pos: u32, tile: u32, tiles: u32| {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let lo = f.floor().clamp(0.0, (tiles - 1) as f32);
        let hi = (lo as u32 + 1).min(tiles - 1);
        (lo as u32, hi, (f - lo).clamp(0.0, 1.0))
    };

    GrayImage::from_fn(width, height, |x, y| {
        let v = image.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, ax) = locate(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = locate(y, tile_h, tiles_y);
        let top = lut(tx0, ty0)[v] as f32 * (1.0 - ax) + lut(tx1, ty0)[v] as f32 * ax;
        let bottom = lut(tx0, ty1)[v] as f32 * (1.0 - ax) + lut(tx1, ty1)[v] as f32 * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

fn clipped_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let (bonus, residual) = (excess / 256, excess % 256);
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from((i as u32) < residual);
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (entry, bin) in lut.iter_mut().zip(hist.iter()) {
        cdf += bin;
        *entry = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Inverted mean-adaptive threshold: a pixel becomes foreground (255) when it
/// is at most `mean - offset`, the mean taken over a (2r+1)² block clipped to the image
pub fn adaptive_threshold_inv(image: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = image.dimensions();
    let integral = IntegralFrame::new(image);
    GrayImage::from_fn(width, height, |x, y| {
        let (x0, y0) = (x.saturating_sub(block_radius), y.saturating_sub(block_radius));
        let (x1, y1) = ((x + block_radius + 1).min(width), (y + block_radius + 1).min(height));
        let area = ((x1 - x0) * (y1 - y0)) as f32;
        let mean = integral.sum(x0, y0, x1 - x0, y1 - y0) as f32 / area;
        let v = image.get_pixel(x, y)[0] as f32;
        Luma([if v <= mean - offset as f32 { 255 } else { 0 }])
    })
}

/// Erode, then dilate, then median-filter a binary mask
pub fn clean_speckle(mask: &GrayImage, erode_iterations: u8, dilate_iterations: u8, median_radius: u32) -> GrayImage {
    let mut out = if erode_iterations > 0 {
        erode(mask, Norm::LInf, erode_iterations)
    } else {
        mask.clone()
    };
    if dilate_iterations > 0 {
        out = dilate(&out, Norm::LInf, dilate_iterations);
    }
    if median_radius > 0 {
        out = median_filter(&out, median_radius, median_radius);
    }
    out
}

/// Gaussian blur followed by an inverted Otsu threshold
pub fn otsu_inverted(image: &GrayImage, sigma: f32) -> GrayImage {
    let blurred = gaussian_blur_f32(image, sigma);
    let level = otsu_level(&blurred);
    GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        Luma([if blurred.get_pixel(x, y)[0] <= level { 255 } else { 0 }])
    })
}

/// 8-connected foreground regions of a binary mask, in raster order of first pixel
pub fn foreground_blobs(mask: &GrayImage) -> Vec<Blob> {
    let (width, height) = mask.dimensions();
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;

    // (area, sum x, sum y, boundary pixels)
    let mut acc = vec![(0u32, 0u64, 0u64, 0u32); count];
    let is_background = |x: i64, y: i64| {
        x < 0 || y < 0 || x >= width as i64 || y >= height as i64 || mask.get_pixel(x as u32, y as u32)[0] == 0
    };
    for (x, y, label) in labels.enumerate_pixels() {
        if label[0] == 0 {
            continue;
        }
        let entry = &mut acc[label[0] as usize - 1];
        entry.0 += 1;
        entry.1 += x as u64;
        entry.2 += y as u64;
        let (xi, yi) = (x as i64, y as i64);
        if is_background(xi - 1, yi) || is_background(xi + 1, yi) || is_background(xi, yi - 1) || is_background(xi, yi + 1) {
            entry.3 += 1;
        }
    }

    acc.into_iter()
        .filter(|(area, ..)| *area > 0)
        .map(|(area, sx, sy, perimeter)| Blob {
            area,
            cx: sx as f32 / area as f32,
            cy: sy as f32 / area as f32,
            perimeter,
        })
        .collect()
}
