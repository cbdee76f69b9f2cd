use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use nalgebra as na;

/// Center and size measured on the detector's sub-pixel box, each truncated
/// to whole pixels only after the arithmetic.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cx: i32,
    pub cy: i32,
    pub width: i64,
    pub height: i64,
}

impl Geometry {
    pub fn from_xyxy([x1, y1, x2, y2]: [f32; 4]) -> Self {
        let (x1, y1, x2, y2) = (
            f64::from(x1),
            f64::from(y1),
            f64::from(x2),
            f64::from(y2),
        );

        Self {
            cx: ((x1 + x2) / 2.0) as i32,
            cy: ((y1 + y2) / 2.0) as i32,
            width: (x2 - x1) as i64,
            height: (y2 - y1) as i64,
        }
    }
}

/// A single detector box for one frame, in integer pixel coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: String,
    /// Takes precedence over the integer box for center and size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl Detection {
    pub fn new<S: Into<String>>(bbox: BBox<Ltrb>, confidence: f32, class: S) -> Self {
        Self {
            bbox,
            confidence,
            class: class.into(),
            geometry: None,
        }
    }

    #[inline]
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Box center, truncated to whole pixels.
    #[inline]
    pub fn center(&self) -> na::Point2<i32> {
        if let Some(g) = self.geometry {
            return na::Point2::new(g.cx, g.cy);
        }

        let mid = |a: i32, b: i32| ((i64::from(a) + i64::from(b)) / 2) as i32;

        na::Point2::new(
            mid(self.bbox.left(), self.bbox.right()),
            mid(self.bbox.top(), self.bbox.bottom()),
        )
    }

    #[inline]
    pub fn width(&self) -> i64 {
        self.geometry.map_or_else(
            || i64::from(self.bbox.right()) - i64::from(self.bbox.left()),
            |g| g.width,
        )
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.geometry.map_or_else(
            || i64::from(self.bbox.bottom()) - i64::from(self.bbox.top()),
            |g| g.height,
        )
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width().saturating_mul(self.height())
    }

    /// Euclidean distance between the centers of two detections.
    #[inline]
    pub fn center_distance(&self, other: &Detection) -> f64 {
        distance(self.center(), other.center())
    }
}

#[inline]
pub(crate) fn distance(a: na::Point2<i32>, b: na::Point2<i32>) -> f64 {
    let a = na::Point2::new(f64::from(a.x), f64::from(a.y));
    let b = na::Point2::new(f64::from(b.x), f64::from(b.y));

    na::distance(&a, &b)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    /// `small` below `small_max`, `medium` below `medium_max`, `large` otherwise.
    pub fn classify(area: i64, small_max: i64, medium_max: i64) -> Self {
        if area < small_max {
            SizeBucket::Small
        } else if area < medium_max {
            SizeBucket::Medium
        } else {
            SizeBucket::Large
        }
    }
}
