use serde::{Deserialize, Serialize};
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug {}

/// Left-top-width-height format, contains left top corner and width-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// Integer pixel box, the layout of the four values is given by `F`
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BBox<F: BBoxFormat + Serialize + Deserialize<'static> + PartialEq>(
    [i32; 4],
    PhantomData<F>,
);

impl<F: BBoxFormat + Serialize + Deserialize<'static> + PartialEq> From<BBox<F>> for [i32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat + Serialize + Deserialize<'static> + PartialEq> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[i32; 4] {
        &self.0
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        BBox([x1, y1, x2, y2], Default::default())
    }

    #[inline]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        self.into()
    }

    #[inline(always)]
    pub fn left(&self) -> i32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> i32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> i32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> i32 {
        self.0[3]
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.right().saturating_sub(self.left())
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.bottom().saturating_sub(self.top())
    }

    /// `x1 < x2 && y1 < y2`
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.left() < self.right() && self.top() < self.bottom()
    }

    /// Grows the box by `padding` on every side.
    #[inline]
    pub fn padded(&self, padding: i32) -> Self {
        Self::ltrb(
            self.left().saturating_sub(padding),
            self.top().saturating_sub(padding),
            self.right().saturating_add(padding),
            self.bottom().saturating_add(padding),
        )
    }

    /// Intersection with a `width`x`height` image, `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width.min(i32::MAX as u32) as i32, height.min(i32::MAX as u32) as i32);
        let clamped = Self::ltrb(
            self.left().clamp(0, w),
            self.top().clamp(0, h),
            self.right().clamp(0, w),
            self.bottom().clamp(0, h),
        );

        clamped.is_valid().then_some(clamped)
    }

    /// True when the box lies completely inside a `width`x`height` image.
    #[inline]
    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        self.left() >= 0
            && self.top() >= 0
            && i64::from(self.right()) <= i64::from(width)
            && i64::from(self.bottom()) <= i64::from(height)
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn ltwh(left: i32, top: i32, width: i32, height: i32) -> Self {
        BBox([left, top, width, height], Default::default())
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }

    #[inline(always)]
    pub fn left(&self) -> i32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> i32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> i32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> i32 {
        self.0[3]
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        Self(
            [v.0[0], v.0[1], v.0[2] + v.0[0], v.0[3] + v.0[1]],
            Default::default(),
        )
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Ltwh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        Self(
            [v.0[0], v.0[1], v.0[2] - v.0[0], v.0[3] - v.0[1]],
            Default::default(),
        )
    }
}
