//! Feature extraction for tile classification.
//!
//! A raw encoded frame becomes a fixed-size descriptor: a min-max
//! normalized hue × saturation histogram plus three scalar color
//! statistics, all computed over an analysis region. The region is the
//! detected tile face when a bright, roughly-rectangular candidate of
//! plausible size exists, otherwise a fixed-ratio center crop. Without
//! the ROI step, hands, arm, and table would dominate the histogram.
//!
//! Extraction is deterministic: the same bytes always produce the same
//! descriptor.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};

/// Hue bins over 0..360 degrees.
pub const HUE_BINS: usize = 36;
/// Saturation bins over 0..1.
pub const SAT_BINS: usize = 32;

/// Luma threshold for the bright tile face (out of 255).
const FACE_LUMA_THRESHOLD: u8 = 190;
/// Square structuring element side for the binary close.
const CLOSE_KERNEL: i64 = 7;
/// Close iterations; two passes bridge the tile's engraved design.
const CLOSE_ITERATIONS: usize = 2;
/// Candidate area bounds as fractions of the full frame.
const MIN_AREA_FRACTION: f64 = 0.05;
const MAX_AREA_FRACTION: f64 = 0.75;
/// Minimum fill of the bounding box (area / bbox area).
const MIN_RECTANGULARITY: f64 = 0.55;
/// Minimum short/long side ratio of the bounding box.
const MIN_ASPECT: f64 = 0.45;
/// Padding around the winning bounding box, in pixels.
const ROI_PAD: u32 = 8;
/// Reject detections smaller than this on either side.
const MIN_ROI_SIDE: u32 = 40;
/// Center-crop ratio used when no ROI candidate passes the filters.
const CENTER_CROP_RATIO: f64 = 0.55;

// Color statistic thresholds, in the same units as the source pixels.
const COLORFUL_SAT_MIN: f64 = 40.0 / 255.0;
const COLORFUL_VAL_MIN: f64 = 40.0 / 255.0;
const GREEN_HUE_MIN_DEG: f64 = 50.0;
const GREEN_HUE_MAX_DEG: f64 = 180.0;
const GREEN_SAT_MIN: f64 = 20.0 / 255.0;
const GREEN_VAL_MIN: f64 = 30.0 / 255.0;

/// Which policy produced the analysis region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    Roi,
    CenterCrop,
}

impl RegionSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Roi => "roi",
            Self::CenterCrop => "center_crop",
        }
    }
}

/// Scalar color statistics over the analysis region, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorFeatures {
    pub mean_saturation: f64,
    pub colorful_pixel_ratio: f64,
    pub green_pixel_ratio: f64,
}

/// The fixed-size descriptor the classifier compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// `HUE_BINS` rows × `SAT_BINS` columns, min-max normalized to [0, 1].
    pub histogram: Vec<Vec<f64>>,
    pub color: ColorFeatures,
}

/// Decode encoded image bytes into RGB pixels. The format is sniffed
/// from the content, never from a filename.
pub fn decode_rgb(bytes: &[u8]) -> StageResult<RgbImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|error| StageError::DecodeFailed(error.to_string()))?;
    Ok(decoded.to_rgb8())
}

/// Compute the descriptor for a frame, using the ROI-or-center-crop
/// policy. Returns the region source alongside for logging.
pub fn extract(bytes: &[u8]) -> StageResult<(Descriptor, RegionSource)> {
    let img = decode_rgb(bytes)?;
    let (region, source) = analysis_region(&img);
    Ok((descriptor_of(&region), source))
}

/// Select the analysis region: detected tile face, or center crop.
#[must_use]
pub fn analysis_region(img: &RgbImage) -> (RgbImage, RegionSource) {
    if let Some(roi) = find_tile_roi(img) {
        return (roi, RegionSource::Roi);
    }
    (center_crop(img, CENTER_CROP_RATIO), RegionSource::CenterCrop)
}

/// Histogram + color statistics over one region.
#[must_use]
pub fn descriptor_of(region: &RgbImage) -> Descriptor {
    Descriptor {
        histogram: hs_histogram(region),
        color: color_features(region),
    }
}

/// Pearson correlation between two normalized histograms, the histogram
/// similarity signal. Degenerate (zero-variance) inputs score 0.
#[must_use]
pub fn histogram_correlation(a: &[Vec<f64>], b: &[Vec<f64>]) -> f64 {
    let xs: Vec<f64> = a.iter().flatten().copied().collect();
    let ys: Vec<f64> = b.iter().flatten().copied().collect();
    if xs.is_empty() || xs.len() != ys.len() {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mean_x: f64 = xs.iter().sum::<f64>() / n;
    let mean_y: f64 = ys.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    cov / denom
}

/// RGB to HSV: hue in degrees [0, 360), saturation and value in [0, 1].
#[must_use]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f64::EPSILON {
        0.0
    } else if (max - r).abs() <= f64::EPSILON {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if (max - g).abs() <= f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f64::EPSILON { 0.0 } else { delta / max };
    (hue.rem_euclid(360.0), saturation, max)
}

fn hs_histogram(region: &RgbImage) -> Vec<Vec<f64>> {
    let mut bins = vec![vec![0.0f64; SAT_BINS]; HUE_BINS];
    for pixel in region.pixels() {
        let (h, s, _v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let hi = ((h / 360.0 * HUE_BINS as f64) as usize).min(HUE_BINS - 1);
        let si = ((s * SAT_BINS as f64) as usize).min(SAT_BINS - 1);
        bins[hi][si] += 1.0;
    }
    normalize_min_max(&mut bins);
    bins
}

/// Min-max normalize all bins to [0, 1] in place. A flat histogram
/// (zero range) normalizes to all zeros.
fn normalize_min_max(bins: &mut [Vec<f64>]) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in bins.iter().flatten() {
        min = min.min(*value);
        max = max.max(*value);
    }
    let range = max - min;
    for value in bins.iter_mut().flatten() {
        *value = if range <= f64::EPSILON {
            0.0
        } else {
            (*value - min) / range
        };
    }
}

fn color_features(region: &RgbImage) -> ColorFeatures {
    let total = f64::from(region.width()) * f64::from(region.height());
    if total <= 0.0 {
        return ColorFeatures {
            mean_saturation: 0.0,
            colorful_pixel_ratio: 0.0,
            green_pixel_ratio: 0.0,
        };
    }
    let mut sat_sum = 0.0;
    let mut colorful = 0.0;
    let mut green = 0.0;
    for pixel in region.pixels() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        sat_sum += s;
        if s > COLORFUL_SAT_MIN && v > COLORFUL_VAL_MIN {
            colorful += 1.0;
        }
        if (GREEN_HUE_MIN_DEG..=GREEN_HUE_MAX_DEG).contains(&h)
            && s >= GREEN_SAT_MIN
            && v >= GREEN_VAL_MIN
        {
            green += 1.0;
        }
    }
    ColorFeatures {
        mean_saturation: sat_sum / total,
        colorful_pixel_ratio: colorful / total,
        green_pixel_ratio: green / total,
    }
}

// ---------------------------------------------------------------------------
// Tile face detection
// ---------------------------------------------------------------------------

/// Locate the bright tile face. Returns the padded crop, or `None` when
/// no candidate passes the area / rectangularity / aspect filters.
fn find_tile_roi(img: &RgbImage) -> Option<RgbImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    if width == 0 || height == 0 {
        return None;
    }

    let mut mask: Vec<bool> = Vec::with_capacity(width * height);
    for pixel in img.pixels() {
        let luma = 0.299 * f64::from(pixel[0])
            + 0.587 * f64::from(pixel[1])
            + 0.114 * f64::from(pixel[2]);
        mask.push(luma > f64::from(FACE_LUMA_THRESHOLD));
    }
    // Close small gaps left by the tile's engraved design.
    for _ in 0..CLOSE_ITERATIONS {
        mask = dilate(&mask, width, height);
    }
    for _ in 0..CLOSE_ITERATIONS {
        mask = erode(&mask, width, height);
    }

    let frame_area = (width * height) as f64;
    let mut best: Option<(f64, Bounds)> = None;
    for component in connected_components(&mask, width, height) {
        let area = component.area as f64;
        if area < frame_area * MIN_AREA_FRACTION || area > frame_area * MAX_AREA_FRACTION {
            continue;
        }
        let bounds = component.bounds;
        let bbox_w = (bounds.max_x - bounds.min_x + 1) as f64;
        let bbox_h = (bounds.max_y - bounds.min_y + 1) as f64;
        let rect_area = bbox_w * bbox_h;
        if rect_area <= 0.0 {
            continue;
        }
        let rectangularity = area / rect_area;
        let aspect = bbox_w.min(bbox_h) / bbox_w.max(bbox_h);
        if rectangularity < MIN_RECTANGULARITY || aspect < MIN_ASPECT {
            continue;
        }
        let score = area * rectangularity;
        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((score, bounds));
        }
    }

    let (_, bounds) = best?;
    let x1 = (bounds.min_x as u32).saturating_sub(ROI_PAD);
    let y1 = (bounds.min_y as u32).saturating_sub(ROI_PAD);
    let x2 = ((bounds.max_x as u32) + 1 + ROI_PAD).min(img.width());
    let y2 = ((bounds.max_y as u32) + 1 + ROI_PAD).min(img.height());
    let roi_w = x2.saturating_sub(x1);
    let roi_h = y2.saturating_sub(y1);
    if roi_w < MIN_ROI_SIDE || roi_h < MIN_ROI_SIDE {
        return None;
    }
    Some(image::imageops::crop_imm(img, x1, y1, roi_w, roi_h).to_image())
}

/// Zero-sized frames pass through unchanged; the descriptor pipeline
/// tolerates empty regions.
#[must_use]
fn center_crop(img: &RgbImage, ratio: f64) -> RgbImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let crop_w = ((f64::from(img.width()) * ratio) as u32).clamp(1, img.width());
    let crop_h = ((f64::from(img.height()) * ratio) as u32).clamp(1, img.height());
    let x0 = (img.width() - crop_w) / 2;
    let y0 = (img.height() - crop_h) / 2;
    image::imageops::crop_imm(img, x0, y0, crop_w, crop_h).to_image()
}

fn dilate(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    morph(mask, width, height, true)
}

fn erode(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    morph(mask, width, height, false)
}

/// Square-kernel morphology. `grow` selects dilation (any neighbor set)
/// versus erosion (all in-bounds neighbors set).
fn morph(mask: &[bool], width: usize, height: usize, grow: bool) -> Vec<bool> {
    let radius = CLOSE_KERNEL / 2;
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut hit = !grow;
            'window: for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let ny = y as i64 + dy;
                    let nx = x as i64 + dx;
                    if ny < 0 || nx < 0 || ny >= height as i64 || nx >= width as i64 {
                        continue;
                    }
                    let value = mask[ny as usize * width + nx as usize];
                    if grow && value {
                        hit = true;
                        break 'window;
                    }
                    if !grow && !value {
                        hit = false;
                        break 'window;
                    }
                }
            }
            out[y * width + x] = hit;
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

struct Component {
    area: usize,
    bounds: Bounds,
}

/// 4-connected components of the binary mask, iterative flood fill.
fn connected_components(mask: &[bool], width: usize, height: usize) -> Vec<Component> {
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut area = 0usize;
        let mut bounds = Bounds {
            min_x: usize::MAX,
            min_y: usize::MAX,
            max_x: 0,
            max_y: 0,
        };
        while let Some(index) = stack.pop() {
            area += 1;
            let x = index % width;
            let y = index / width;
            bounds.min_x = bounds.min_x.min(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_x = bounds.max_x.max(x);
            bounds.max_y = bounds.max_y.max(y);

            let neighbors = [
                (x > 0).then(|| index - 1),
                (x + 1 < width).then(|| index + 1),
                (y > 0).then(|| index - width),
                (y + 1 < height).then(|| index + width),
            ];
            for neighbor in neighbors.into_iter().flatten() {
                if mask[neighbor] && !visited[neighbor] {
                    visited[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }
        components.push(Component { area, bounds });
    }
    components
}
