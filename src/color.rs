//! Vehicle color from the pixels inside a detection box.
//!
//! Two independent paths are available:
//!
//! * [`ColorClassifier::detect_color`] votes HSV ranges over the central
//!   half of the box, which keeps road and sky at the edges out of the count.
//! * [`ColorClassifier::dominant_color`] clusters the whole box with k-means
//!   and names the centroid of the biggest cluster.
//!
//! HSV values follow the 8-bit convention of most vision toolkits: hue in
//! `0..=180`, saturation and value in `0..=255`.

use image::{imageops, RgbImage};
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::bbox::{BBox, Ltrb};
use crate::error::Error;
use crate::math::{kmeans, Criteria};

pub const DEFAULT_CLUSTERS: usize = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum VehicleColor {
    Red,
    Blue,
    Green,
    Yellow,
    White,
    Black,
    Gray,
    Orange,
    Unknown,
}

impl VehicleColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleColor::Red => "red",
            VehicleColor::Blue => "blue",
            VehicleColor::Green => "green",
            VehicleColor::Yellow => "yellow",
            VehicleColor::White => "white",
            VehicleColor::Black => "black",
            VehicleColor::Gray => "gray",
            VehicleColor::Orange => "orange",
            VehicleColor::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VehicleColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which classifier the session runs for every detection.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColorMethod {
    #[default]
    Ranges,
    Dominant { k: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    #[inline]
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

const HSV_SHIFT: u32 = 12;

/// `round(num << HSV_SHIFT / den)`, zero for a zero divisor.
#[inline]
fn fixed_div(num: i32, den: i32) -> i32 {
    if den == 0 {
        0
    } else {
        (f64::from(num << HSV_SHIFT) / f64::from(den)).round() as i32
    }
}

/// 8-bit RGB to HSV with hue halved into `0..180`.
///
/// Fixed-point arithmetic with 12 fractional bits and per-divisor reciprocals,
/// so values match the common 8-bit vision toolkit bit for bit.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let half = 1 << (HSV_SHIFT - 1);

    let v = r.max(g).max(b);
    let diff = v - r.min(g).min(b);

    let s = (diff * fixed_div(255, v) + half) >> HSV_SHIFT;

    let h = if v == r {
        g - b
    } else if v == g {
        b - r + 2 * diff
    } else {
        r - g + 4 * diff
    };

    let mut h = (h * fixed_div(180, 6 * diff) + half) >> HSV_SHIFT;
    if h < 0 {
        h += 180;
    }

    Hsv::new(h.clamp(0, 180) as u8, s.clamp(0, 255) as u8, v as u8)
}

/// Inclusive box in HSV space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl HsvRange {
    pub const fn new(lower: (u8, u8, u8), upper: (u8, u8, u8)) -> Self {
        Self {
            lower: Hsv::new(lower.0, lower.1, lower.2),
            upper: Hsv::new(upper.0, upper.1, upper.2),
        }
    }

    #[inline]
    pub fn contains(&self, px: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&px.h)
            && (self.lower.s..=self.upper.s).contains(&px.s)
            && (self.lower.v..=self.upper.v).contains(&px.v)
    }
}

/// Voting table; on equal counts the earlier entry wins.
pub const COLOR_RANGES: [(VehicleColor, &[HsvRange]); 8] = [
    (
        VehicleColor::Red,
        // hue wraps around, so red needs both ends
        &[
            HsvRange::new((0, 100, 100), (10, 255, 255)),
            HsvRange::new((160, 100, 100), (180, 255, 255)),
        ],
    ),
    (
        VehicleColor::Blue,
        &[HsvRange::new((100, 100, 100), (130, 255, 255))],
    ),
    (
        VehicleColor::Green,
        &[HsvRange::new((40, 50, 50), (80, 255, 255))],
    ),
    (
        VehicleColor::Yellow,
        &[HsvRange::new((20, 100, 100), (30, 255, 255))],
    ),
    (
        VehicleColor::White,
        &[HsvRange::new((0, 0, 200), (180, 30, 255))],
    ),
    (
        VehicleColor::Black,
        &[HsvRange::new((0, 0, 0), (180, 255, 50))],
    ),
    (
        VehicleColor::Gray,
        &[HsvRange::new((0, 0, 50), (180, 50, 200))],
    ),
    (
        VehicleColor::Orange,
        &[HsvRange::new((10, 100, 100), (20, 255, 255))],
    ),
];

/// Names a single HSV color by value, then saturation, then hue bucket.
pub fn hsv_to_color(hsv: Hsv) -> VehicleColor {
    let Hsv { h, s, v } = hsv;

    if v < 50 {
        VehicleColor::Black
    } else if s < 30 {
        if v > 200 {
            VehicleColor::White
        } else {
            VehicleColor::Gray
        }
    } else if h < 10 || h > 160 {
        VehicleColor::Red
    } else if h < 20 {
        VehicleColor::Orange
    } else if h < 35 {
        VehicleColor::Yellow
    } else if h < 85 {
        VehicleColor::Green
    } else if h < 135 {
        VehicleColor::Blue
    } else {
        VehicleColor::Unknown
    }
}

/// Counts pixels per range set and returns the best-scoring color.
pub fn vote<I: IntoIterator<Item = Hsv>>(pixels: I) -> VehicleColor {
    let mut scores = [0usize; COLOR_RANGES.len()];

    for px in pixels {
        for (score, (_, ranges)) in scores.iter_mut().zip(COLOR_RANGES.iter()) {
            if ranges.iter().any(|r| r.contains(px)) {
                *score += 1;
            }
        }
    }

    let mut best = (VehicleColor::Unknown, 0);

    for (&score, &(color, _)) in scores.iter().zip(COLOR_RANGES.iter()) {
        if score > best.1 {
            best = (color, score);
        }
    }

    best.0
}

/// Part of `image` under `bbox`, `None` when nothing of the box is inside.
pub fn crop(image: &RgbImage, bbox: &BBox<Ltrb>) -> Option<RgbImage> {
    let rect = bbox.clamp_to(image.width(), image.height())?.as_ltwh();

    Some(
        imageops::crop_imm(
            image,
            rect.left() as u32,
            rect.top() as u32,
            rect.width() as u32,
            rect.height() as u32,
        )
        .to_image(),
    )
}

#[derive(Debug, Clone)]
pub struct ColorClassifier {
    /// Side of the square the crop is resized to before clustering
    pub cluster_size: u32,
    pub criteria: Criteria,
    pub attempts: usize,
    pub seed: u64,
}

impl Default for ColorClassifier {
    fn default() -> Self {
        Self {
            cluster_size: 100,
            criteria: Criteria::default(),
            attempts: 10,
            seed: 0,
        }
    }
}

impl ColorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(
        &self,
        image: &RgbImage,
        bbox: &BBox<Ltrb>,
        method: ColorMethod,
    ) -> Result<VehicleColor, Error> {
        match method {
            ColorMethod::Ranges => Ok(self.detect_color(image, bbox)),
            ColorMethod::Dominant { k } => self.dominant_color(image, bbox, k),
        }
    }

    /// HSV range vote over the central 50%x50% of the box.
    pub fn detect_color(&self, image: &RgbImage, bbox: &BBox<Ltrb>) -> VehicleColor {
        let Some(region) = crop(image, bbox) else {
            return VehicleColor::Unknown;
        };

        let (w, h) = region.dimensions();
        let (cx, cy) = (w / 2, h / 2);
        let (mx, my) = (w / 4, h / 4);

        let (x0, x1) = (cx - mx, (cx + mx).min(w));
        let (y0, y1) = (cy - my, (cy + my).min(h));

        let pixels = (y0..y1).flat_map(|y| {
            let region = &region;
            (x0..x1).map(move |x| {
                let [r, g, b] = region.get_pixel(x, y).0;
                rgb_to_hsv(r, g, b)
            })
        });

        vote(pixels)
    }

    /// Color of the largest of `k` k-means clusters over the resized box.
    pub fn dominant_color(
        &self,
        image: &RgbImage,
        bbox: &BBox<Ltrb>,
        k: usize,
    ) -> Result<VehicleColor, Error> {
        if k == 0 {
            return Err(Error::InvalidClusterCount(k));
        }

        let Some(region) = crop(image, bbox) else {
            return Ok(VehicleColor::Unknown);
        };

        let side = self.cluster_size.max(1);
        let small = imageops::resize(&region, side, side, imageops::FilterType::Triangle);

        // samples are laid out b, g, r
        let mut samples = Array2::<f32>::zeros((small.width() as usize * small.height() as usize, 3));
        for (mut row, px) in samples.outer_iter_mut().zip(small.pixels()) {
            let [r, g, b] = px.0;
            row[0] = f32::from(b);
            row[1] = f32::from(g);
            row[2] = f32::from(r);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let Some(clusters) = kmeans(samples.view(), k, self.criteria, self.attempts, &mut rng)
        else {
            return Ok(VehicleColor::Unknown);
        };

        let Some(largest) = clusters.largest() else {
            return Ok(VehicleColor::Unknown);
        };

        let center = clusters.centers.row(largest);
        let channel = |i: usize| (center[i] as i32).clamp(0, 255) as u8;

        Ok(hsv_to_color(rgb_to_hsv(channel(2), channel(1), channel(0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn filled(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(rgb))
    }

    #[test]
    fn hsv_conversion() {
        assert_eq!(rgb_to_hsv(255, 255, 255), Hsv::new(0, 0, 255));
        assert_eq!(rgb_to_hsv(0, 0, 0), Hsv::new(0, 0, 0));
        assert_eq!(rgb_to_hsv(255, 0, 0), Hsv::new(0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), Hsv::new(60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), Hsv::new(120, 255, 255));
        assert_eq!(rgb_to_hsv(255, 255, 0), Hsv::new(30, 255, 255));
        // magenta sits right at the wrap-around
        assert_eq!(rgb_to_hsv(255, 0, 255), Hsv::new(150, 255, 255));
        assert_eq!(rgb_to_hsv(255, 0, 10), Hsv::new(179, 255, 255));
        assert_eq!(rgb_to_hsv(160, 0, 200), Hsv::new(144, 255, 200));
    }

    #[test]
    fn hsv_saturation_rounds_like_fixed_point() {
        // 255 * 180 / 200 = 229.5 exactly, the reciprocal table lands just below
        assert_eq!(rgb_to_hsv(200, 20, 20), Hsv::new(0, 229, 200));
        assert_eq!(rgb_to_hsv(128, 128, 128), Hsv::new(0, 0, 128));
    }

    #[test]
    fn white_pixels_vote_white() {
        assert_eq!(
            vote(std::iter::repeat(Hsv::new(0, 0, 255)).take(16)),
            VehicleColor::White
        );
    }

    #[test]
    fn unmatched_pixels_are_unknown() {
        // purple with high saturation is in none of the ranges
        assert_eq!(
            vote(std::iter::repeat(Hsv::new(144, 255, 200)).take(16)),
            VehicleColor::Unknown
        );
        assert_eq!(vote(std::iter::empty()), VehicleColor::Unknown);
    }

    #[test]
    fn ties_follow_table_order() {
        // h=10 is both red and orange
        assert_eq!(vote([Hsv::new(10, 200, 200)]), VehicleColor::Red);
    }

    #[test]
    fn detect_color_uses_center_region() {
        // blue car on a white background: only the border is white
        let mut img = filled(200, 200, [255, 255, 255]);
        for y in 60..140 {
            for x in 60..140 {
                img.put_pixel(x, y, Rgb([0, 0, 200]));
            }
        }

        let clf = ColorClassifier::new();
        assert_eq!(
            clf.detect_color(&img, &BBox::ltrb(20, 20, 180, 180)),
            VehicleColor::Blue
        );
        assert_eq!(
            clf.detect_color(&img, &BBox::ltrb(0, 0, 40, 40)),
            VehicleColor::White
        );
    }

    #[test]
    fn detect_color_degenerate_boxes() {
        let img = filled(50, 50, [255, 0, 0]);
        let clf = ColorClassifier::new();

        assert_eq!(clf.detect_color(&img, &BBox::ltrb(10, 10, 10, 30)), VehicleColor::Unknown);
        assert_eq!(clf.detect_color(&img, &BBox::ltrb(60, 60, 90, 90)), VehicleColor::Unknown);
        // one pixel tall: the central half is empty
        assert_eq!(clf.detect_color(&img, &BBox::ltrb(0, 0, 20, 1)), VehicleColor::Unknown);
        // partially outside is clamped
        assert_eq!(clf.detect_color(&img, &BBox::ltrb(-20, -20, 30, 30)), VehicleColor::Red);
    }

    #[test]
    fn detect_color_purple_is_unknown() {
        let img = filled(40, 40, [160, 0, 200]);

        assert_eq!(
            ColorClassifier::new().detect_color(&img, &BBox::ltrb(0, 0, 40, 40)),
            VehicleColor::Unknown
        );
    }

    #[test]
    fn centroid_naming() {
        assert_eq!(hsv_to_color(Hsv::new(100, 200, 40)), VehicleColor::Black);
        assert_eq!(hsv_to_color(Hsv::new(0, 10, 230)), VehicleColor::White);
        assert_eq!(hsv_to_color(Hsv::new(0, 10, 120)), VehicleColor::Gray);
        assert_eq!(hsv_to_color(Hsv::new(170, 200, 200)), VehicleColor::Red);
        assert_eq!(hsv_to_color(Hsv::new(15, 200, 200)), VehicleColor::Orange);
        assert_eq!(hsv_to_color(Hsv::new(30, 200, 200)), VehicleColor::Yellow);
        assert_eq!(hsv_to_color(Hsv::new(60, 200, 200)), VehicleColor::Green);
        assert_eq!(hsv_to_color(Hsv::new(120, 200, 200)), VehicleColor::Blue);
        assert_eq!(hsv_to_color(Hsv::new(150, 200, 200)), VehicleColor::Unknown);
    }

    #[test]
    fn dominant_color_picks_largest_cluster() {
        // mostly green with a red stripe
        let mut img = filled(60, 60, [20, 180, 30]);
        for y in 0..10 {
            for x in 0..60 {
                img.put_pixel(x, y, Rgb([220, 10, 10]));
            }
        }

        let clf = ColorClassifier::new();
        assert_eq!(
            clf.dominant_color(&img, &BBox::ltrb(0, 0, 60, 60), DEFAULT_CLUSTERS).unwrap(),
            VehicleColor::Green
        );
        assert_eq!(
            clf.dominant_color(&img, &BBox::ltrb(0, 0, 60, 8), DEFAULT_CLUSTERS).unwrap(),
            VehicleColor::Red
        );
    }

    #[test]
    fn dominant_color_errors_and_empty() {
        let img = filled(10, 10, [0, 0, 255]);
        let clf = ColorClassifier::new();

        assert!(matches!(
            clf.dominant_color(&img, &BBox::ltrb(0, 0, 10, 10), 0),
            Err(Error::InvalidClusterCount(0))
        ));
        assert_eq!(
            clf.dominant_color(&img, &BBox::ltrb(20, 20, 30, 30), 3).unwrap(),
            VehicleColor::Unknown
        );
        assert_eq!(
            clf.classify(&img, &BBox::ltrb(0, 0, 10, 10), ColorMethod::Dominant { k: 2 })
                .unwrap(),
            VehicleColor::Blue
        );
    }
}
