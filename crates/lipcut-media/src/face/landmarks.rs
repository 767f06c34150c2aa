//! 68-point facial landmarks.
//!
//! # Landmarks Layout (iBUG 68-point scheme)
//!
//! - 0-16: Jaw outline
//! - 17-21: Right eyebrow
//! - 22-26: Left eyebrow
//! - 27-35: Nose
//! - 36-41: Right eye
//! - 42-47: Left eye
//! - 48-59: Outer lip
//! - 60-67: Inner lip
//!
//! "Left" and "right" are the person's, so the right eyebrow appears on the
//! left of the image.

use lipcut_models::MouthRatio;

/// Number of points in a complete landmark set.
pub const LANDMARK_COUNT: usize = 68;

pub const RIGHT_EYEBROW: &[usize] = &[17, 18, 19, 20, 21];
pub const LEFT_EYEBROW: &[usize] = &[22, 23, 24, 25, 26];
/// Outer upper lip left to right, then the inner upper lip back.
pub const TOP_LIP: &[usize] = &[48, 49, 50, 51, 52, 53, 54, 64, 63, 62, 61, 60];
/// Outer lower lip right to left, then the inner lower lip back.
pub const BOTTOM_LIP: &[usize] = &[54, 55, 56, 57, 58, 59, 48, 60, 67, 66, 65, 64];

/// A landmark in pixel coordinates of the image it was detected in.
pub type Point = (f64, f64);

/// 68-point facial landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

/// Axis-aligned bounds of a group of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl PointBounds {
    pub fn center(&self) -> Point {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

impl FaceLandmarks {
    /// Wrap detected points. Returns `None` unless there are exactly 68.
    pub fn new(points: Vec<Point>) -> Option<Self> {
        (points.len() == LANDMARK_COUNT).then_some(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    fn group(&self, indices: &[usize]) -> Vec<Point> {
        indices.iter().map(|&i| self.points[i]).collect()
    }

    pub fn right_eyebrow(&self) -> Vec<Point> {
        self.group(RIGHT_EYEBROW)
    }

    pub fn left_eyebrow(&self) -> Vec<Point> {
        self.group(LEFT_EYEBROW)
    }

    pub fn top_lip(&self) -> Vec<Point> {
        self.group(TOP_LIP)
    }

    pub fn bottom_lip(&self) -> Vec<Point> {
        self.group(BOTTOM_LIP)
    }

    /// How open the mouth is relative to its width.
    ///
    /// Both lips are sorted left to right. The width is the mean of the
    /// end-to-end distances of the two lips, the opening is the distance
    /// between their middle points.
    pub fn mouth_ratio(&self) -> Option<MouthRatio> {
        let top = sorted_by_x(self.top_lip());
        let bottom = sorted_by_x(self.bottom_lip());

        let top_width = distance(*top.first()?, *top.last()?);
        let bottom_width = distance(*bottom.first()?, *bottom.last()?);
        let width = (top_width + bottom_width) / 2.0;

        let opening = distance(top[top.len() / 2], bottom[bottom.len() / 2]);

        MouthRatio::from_measurements(opening, width)
    }

    /// Outer eyebrow points as they appear left to right in the image.
    ///
    /// The left one is the second left-most point of the right eyebrow, the
    /// right one is the right-most point of the left eyebrow.
    pub fn outer_eyebrow_points(&self) -> (Point, Point) {
        let right_brow = sorted_by_x(self.right_eyebrow());
        let left_brow = sorted_by_x(self.left_eyebrow());
        (right_brow[1], left_brow[left_brow.len() - 1])
    }

    /// Signed tilt of the eyebrow line in degrees.
    ///
    /// Positive when the right side of the image is lower (y grows downward).
    pub fn eyebrow_tilt_degrees(&self) -> f64 {
        let (from, to) = self.outer_eyebrow_points();
        (to.1 - from.1).atan2(to.0 - from.0).to_degrees()
    }

    /// Bounds of both lips together.
    pub fn lip_bounds(&self) -> PointBounds {
        let mut bounds = PointBounds {
            left: f64::INFINITY,
            top: f64::INFINITY,
            right: f64::NEG_INFINITY,
            bottom: f64::NEG_INFINITY,
        };
        for (x, y) in self.top_lip().into_iter().chain(self.bottom_lip()) {
            bounds.left = bounds.left.min(x);
            bounds.right = bounds.right.max(x);
            bounds.top = bounds.top.min(y);
            bounds.bottom = bounds.bottom.max(y);
        }
        bounds
    }
}

fn sorted_by_x(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

fn distance(a: Point, b: Point) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}
