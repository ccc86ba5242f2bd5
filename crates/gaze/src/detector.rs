//! Multi-scale sliding-window detector shared by the face and eye stages
//!
//! The face and eye detectors differ only in their [`DetectorConfig`] and
//! cascade model; both go through [`CascadeDetector`].

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cascade::{HaarCascade, IntegralFrame};
use crate::config::{DetectorConfig, SearchRegion};
use crate::GazeError;

/// Relative tolerance used when clustering raw window hits
const GROUPING_EPS: f32 = 0.2;

/// Axis-aligned rectangle in the coordinate space of its parent image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Geometric center
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// True unless the rectangles are strictly separated; touching edges count
    pub fn overlaps(&self, other: &Region) -> bool {
        !(self.right() < other.x
            || other.right() < self.x
            || self.bottom() < other.y
            || other.bottom() < self.y)
    }

    /// Translate into the parent's parent coordinate space
    pub fn offset(&self, dx: u32, dy: u32) -> Region {
        Region::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x as f32 && x <= self.right() as f32 && y >= self.y as f32 && y <= self.bottom() as f32
    }

    /// Clip to an image of the given size; `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let w = self.right().min(width) - x;
        let h = self.bottom().min(height) - y;
        (w > 0 && h > 0).then(|| Region::new(x, y, w, h))
    }
}

/// A detected region and the number of raw window hits merged into it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub region: Region,
    pub neighbors: u32,
}

/// Sliding-window Haar cascade detector
pub struct CascadeDetector {
    cascade: HaarCascade,
    config: DetectorConfig,
}

impl CascadeDetector {
    pub fn new(cascade: HaarCascade, config: DetectorConfig) -> Result<Self, GazeError> {
        cascade.validate()?;
        config.validate()?;
        info!(
            "Cascade detector ready: {}x{} window, scale {}, min neighbors {}",
            cascade.window_width, cascade.window_height, config.scale_factor, config.min_neighbors
        );
        Ok(Self { cascade, config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect objects in `image`. Regions are in `image` coordinates.
    ///
    /// Pure function of the input: no state survives between calls.
    pub fn detect(&self, image: &GrayImage) -> Vec<Detection> {
        let (width, height) = image.dimensions();
        let roi = match self.config.search_region {
            SearchRegion::Full => Region::new(0, 0, width, height),
            SearchRegion::UpperHalf => Region::new(0, 0, width, height / 2),
        };
        if roi.width == 0 || roi.height == 0 {
            return Vec::new();
        }

        let hits = if roi.height == height {
            self.scan(image)
        } else {
            self.scan(&imageops::crop_imm(image, roi.x, roi.y, roi.width, roi.height).to_image())
        };

        let min_w = self.config.min_relative_size * width as f32;
        let min_h = self.config.min_relative_size * height as f32;
        let grouped: Vec<Detection> = group_rectangles(&hits, self.config.min_neighbors)
            .into_iter()
            .map(|d| Detection {
                region: d.region.offset(roi.x, roi.y),
                ..d
            })
            .filter(|d| d.region.width as f32 >= min_w && d.region.height as f32 >= min_h)
            .collect();

        debug!(
            "{} raw hits grouped into {} detections in {}x{} image",
            hits.len(),
            grouped.len(),
            width,
            height
        );

        if self.config.dedup_overlapping {
            dedup_non_overlapping(grouped, self.config.max_detections)
        } else {
            match self.config.max_detections {
                Some(cap) => grouped.into_iter().take(cap).collect(),
                None => grouped,
            }
        }
    }

    /// Every window position the cascade accepts, over all scales
    fn scan(&self, image: &GrayImage) -> Vec<Region> {
        let (width, height) = image.dimensions();
        let integral = IntegralFrame::new(image);
        let (min_w, min_h) = self.config.min_size;
        let mut hits = Vec::new();

        let mut scale = 1.0f32;
        loop {
            let (ww, wh) = self.cascade.scaled_window(scale);
            if ww > width || wh > height {
                break;
            }
            if ww >= min_w && wh >= min_h {
                let step = if scale < 2.0 {
                    ((2.0 * scale).round() as u32).max(1)
                } else {
                    scale.round() as u32
                };
                for y in (0..=height - wh).step_by(step as usize) {
                    for x in (0..=width - ww).step_by(step as usize) {
                        if self.cascade.evaluate(&integral, x, y, scale) {
                            hits.push(Region::new(x, y, ww, wh));
                        }
                    }
                }
            }
            scale *= self.config.scale_factor;
        }
        hits
    }
}

/// Greedy, order-dependent overlap removal: keep a detection only if it does
/// not overlap one already kept, stop at `cap`.
///
/// TODO: replace with non-max suppression ranked by neighbor count; two
/// duplicates can both survive when the cap is hit before they are compared.
pub fn dedup_non_overlapping(detections: Vec<Detection>, cap: Option<usize>) -> Vec<Detection> {
    let cap = cap.unwrap_or(usize::MAX);
    let mut kept: Vec<Detection> = Vec::new();
    for detection in detections {
        if kept.len() >= cap {
            break;
        }
        if kept.iter().all(|k| !k.region.overlaps(&detection.region)) {
            kept.push(detection);
        }
    }
    kept
}

fn similar(a: &Region, b: &Region) -> bool {
    let delta = GROUPING_EPS * (a.width.min(b.width) + a.height.min(b.height)) as f32 * 0.5;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x) && close(a.y, b.y) && close(a.right(), b.right()) && close(a.bottom(), b.bottom())
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster similar raw hits, average each cluster and drop clusters with at
/// most `min_neighbors` members or nested inside a stronger one.
fn group_rectangles(hits: &[Region], min_neighbors: u32) -> Vec<Detection> {
    if min_neighbors == 0 {
        return hits
            .iter()
            .map(|&region| Detection { region, neighbors: 1 })
            .collect();
    }

    let mut parent: Vec<usize> = (0..hits.len()).collect();
    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            if similar(&hits[i], &hits[j]) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    // (root, sum x, sum y, sum w, sum h, count), in order of first appearance
    let mut clusters: Vec<(usize, [u64; 4], u32)> = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        let root = find(&mut parent, i);
        let sums = [hit.x as u64, hit.y as u64, hit.width as u64, hit.height as u64];
        match clusters.iter_mut().find(|(r, _, _)| *r == root) {
            Some((_, acc, count)) => {
                acc.iter_mut().zip(sums).for_each(|(a, s)| *a += s);
                *count += 1;
            }
            None => clusters.push((root, sums, 1)),
        }
    }

    let averaged: Vec<Detection> = clusters
        .into_iter()
        .filter(|(_, _, count)| *count > min_neighbors)
        .map(|(_, acc, count)| {
            let avg = |v: u64| (v as f64 / count as f64).round() as u32;
            Detection {
                region: Region::new(avg(acc[0]), avg(acc[1]), avg(acc[2]), avg(acc[3])),
                neighbors: count,
            }
        })
        .collect();

    averaged
        .iter()
        .enumerate()
        .filter(|(i, inner)| {
            !averaged.iter().enumerate().any(|(j, outer)| {
                if *i == j {
                    return false;
                }
                let dx = (outer.region.width as f32 * GROUPING_EPS).round() as i64;
                let dy = (outer.region.height as f32 * GROUPING_EPS).round() as i64;
                let (r1, r2) = (&inner.region, &outer.region);
                r1.x as i64 >= r2.x as i64 - dx
                    && r1.y as i64 >= r2.y as i64 - dy
                    && r1.right() as i64 <= r2.right() as i64 + dx
                    && r1.bottom() as i64 <= r2.bottom() as i64 + dy
                    && (outer.neighbors > inner.neighbors.max(3) || inner.neighbors < 3)
            })
        })
        .map(|(_, d)| *d)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::dark_square_cascade;
    use image::Luma;

    fn image_with_squares(width: u32, height: u32, squares: &[Region]) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let dark = squares.iter().any(|s| {
                x >= s.x && x < s.right() && y >= s.y && y < s.bottom()
            });
            Luma([if dark { 0 } else { 255 }])
        })
    }

    fn detection(x: u32, y: u32, w: u32, h: u32) -> Detection {
        Detection { region: Region::new(x, y, w, h), neighbors: 5 }
    }

    #[test]
    fn test_overlap_predicate() {
        let a = Region::new(0, 0, 10, 10);
        assert!(a.overlaps(&Region::new(5, 5, 10, 10)));
        // touching edges count as overlap
        assert!(a.overlaps(&Region::new(10, 0, 5, 5)));
        assert!(!a.overlaps(&Region::new(11, 0, 5, 5)));
        assert!(!a.overlaps(&Region::new(0, 11, 5, 5)));
    }

    #[test]
    fn test_region_helpers() {
        let r = Region::new(10, 20, 30, 40);
        assert_eq!(r.center(), (25.0, 40.0));
        assert_eq!(r.offset(5, 5), Region::new(15, 25, 30, 40));
        assert!(r.contains(25.0, 40.0));
        assert!(!r.contains(5.0, 40.0));
        assert_eq!(r.clamp_to(20, 100), Some(Region::new(10, 20, 10, 40)));
        assert_eq!(r.clamp_to(5, 5), None);
    }

    #[test]
    fn test_dedup_is_greedy_and_capped() {
        let input = vec![
            detection(0, 0, 10, 10),
            detection(5, 5, 10, 10),
            detection(30, 0, 10, 10),
            detection(60, 0, 10, 10),
        ];
        let kept = dedup_non_overlapping(input, Some(2));
        assert_eq!(kept, vec![detection(0, 0, 10, 10), detection(30, 0, 10, 10)]);
    }

    #[test]
    fn test_dedup_depends_on_order() {
        let wide = detection(0, 0, 30, 10);
        let left = detection(0, 0, 10, 10);
        let right = detection(20, 0, 10, 10);
        assert_eq!(dedup_non_overlapping(vec![wide, left, right], None), vec![wide]);
        assert_eq!(dedup_non_overlapping(vec![left, right, wide], None), vec![left, right]);
    }

    #[test]
    fn test_grouping_requires_more_than_min_neighbors() {
        let hits = vec![Region::new(10, 10, 20, 20); 3];
        assert!(group_rectangles(&hits, 3).is_empty());
        let hits = vec![Region::new(10, 10, 20, 20); 4];
        let grouped = group_rectangles(&hits, 3);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].neighbors, 4);
    }

    #[test]
    fn test_grouping_averages_cluster() {
        let hits = vec![
            Region::new(10, 10, 20, 20),
            Region::new(12, 10, 20, 20),
            Region::new(10, 12, 20, 20),
            Region::new(12, 12, 20, 20),
            Region::new(80, 80, 20, 20),
        ];
        let grouped = group_rectangles(&hits, 2);
        assert_eq!(grouped, vec![Detection { region: Region::new(11, 11, 20, 20), neighbors: 4 }]);
    }

    #[test]
    fn test_face_dominating_frame_detected() {
        let config = DetectorConfig { min_size: (60, 60), ..DetectorConfig::face() };
        let detector = CascadeDetector::new(dark_square_cascade(20), config).unwrap();
        let image = image_with_squares(100, 100, &[Region::new(25, 25, 50, 50)]);

        let faces = detector.detect(&image);
        assert!(!faces.is_empty());
        for face in &faces {
            assert!(face.region.width >= 40 && face.region.height >= 40);
            assert!(face.region.contains(50.0, 50.0));
        }
    }

    #[test]
    fn test_small_background_face_rejected() {
        let image = image_with_squares(200, 200, &[Region::new(90, 90, 20, 20)]);

        let lenient = DetectorConfig { min_relative_size: 0.0, ..DetectorConfig::face() };
        let detector = CascadeDetector::new(dark_square_cascade(20), lenient).unwrap();
        assert!(!detector.detect(&image).is_empty());

        let detector = CascadeDetector::new(dark_square_cascade(20), DetectorConfig::face()).unwrap();
        assert!(detector.detect(&image).is_empty());
    }

    #[test]
    fn test_flat_image_has_no_detections() {
        let detector = CascadeDetector::new(dark_square_cascade(20), DetectorConfig::face()).unwrap();
        assert!(detector.detect(&GrayImage::from_pixel(80, 80, Luma([120]))).is_empty());
    }

    #[test]
    fn test_eye_search_ignores_lower_half() {
        let detector = CascadeDetector::new(dark_square_cascade(10), DetectorConfig::eye()).unwrap();
        let face = image_with_squares(
            100,
            100,
            &[
                Region::new(20, 20, 10, 10),
                Region::new(70, 20, 10, 10),
                Region::new(45, 75, 10, 10),
            ],
        );

        let eyes = detector.detect(&face);
        assert!(!eyes.is_empty() && eyes.len() <= 2);
        for (i, a) in eyes.iter().enumerate() {
            assert!(a.region.bottom() <= 50);
            for b in &eyes[i + 1..] {
                assert!(!a.region.overlaps(&b.region));
            }
        }
    }

    #[test]
    fn test_image_smaller_than_window() {
        let detector = CascadeDetector::new(dark_square_cascade(20), DetectorConfig::face()).unwrap();
        assert!(detector.detect(&GrayImage::new(10, 10)).is_empty());
        assert!(detector.detect(&GrayImage::new(0, 0)).is_empty());
    }
}
