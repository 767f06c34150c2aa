//! Face bounding boxes in pixel coordinates.

use serde::{Deserialize, Serialize};

/// Bounding box of a detected face, in frame pixels.
///
/// Fields are ordered the way the analysis file stores them:
/// left, top, bottom, right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceBox {
    pub left: i32,
    pub top: i32,
    pub bottom: i32,
    pub right: i32,
}

impl FaceBox {
    /// Create a new face box.
    pub fn new(left: i32, top: i32, bottom: i32, right: i32) -> Self {
        Self {
            left,
            top,
            bottom,
            right,
        }
    }

    /// Build from floating point corners, rounding to the nearest pixel.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(
            x1.round() as i32,
            y1.round() as i32,
            y2.round() as i32,
            x2.round() as i32,
        )
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Box area in pixels (zero for degenerate boxes).
    #[inline]
    pub fn area(&self) -> i64 {
        i64::from(self.width().max(0)) * i64::from(self.height().max(0))
    }

    /// Whether both sides are at least `min` pixels.
    pub fn is_at_least(&self, min: i32) -> bool {
        self.width() >= min && self.height() >= min
    }

    /// Grow the shorter side symmetrically so the box becomes square.
    ///
    /// Each side grows by half the difference (integer division), so an odd
    /// difference leaves the box one pixel short of square.
    pub fn to_square(&self) -> FaceBox {
        let (width, height) = (self.width(), self.height());
        let mut squared = *self;

        if width < height {
            let half = (height - width) / 2;
            squared.left -= half;
            squared.right += half;
        } else {
            let half = (width - height) / 2;
            squared.top -= half;
            squared.bottom += half;
        }

        squared
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &FaceBox) -> f64 {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);

        if right <= left || bottom <= top {
            return 0.0;
        }

        let intersection = i64::from(right - left) * i64::from(bottom - top);
        let union = self.area() + other.area() - intersection;
        if union > 0 {
            intersection as f64 / union as f64
        } else {
            0.0
        }
    }
}
