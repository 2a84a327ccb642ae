use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Point2D is a landmark position in image pixel coordinates.
pub type Point2D = Point2<f64>;

/// Number of points produced by the 5-point landmark model.
pub const LANDMARK_COUNT: usize = 5;

// 5-point landmark order. Indices 0,1 sit on the viewer's right eye (higher x),
// indices 2,3 on the viewer's left eye (lower x).
pub const LEFT_EYE_OUTER: usize = 0;
pub const LEFT_EYE_INNER: usize = 1;
pub const RIGHT_EYE_INNER: usize = 2;
pub const RIGHT_EYE_OUTER: usize = 3;
pub const NOSE_TIP: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate2D {
    pub x: f64,
    pub y: f64,
}

impl From<Coordinate2D> for Point2D {
    fn from(c: Coordinate2D) -> Self {
        Point2D::new(c.x, c.y)
    }
}

impl From<Point2D> for Coordinate2D {
    fn from(p: Point2D) -> Self {
        Coordinate2D { x: p.x, y: p.y }
    }
}

/// FaceLandmark is the named view of a 5-point landmark set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceLandmark {
    pub left_eye_outer: Coordinate2D,
    pub left_eye_inner: Coordinate2D,
    pub right_eye_inner: Coordinate2D,
    pub right_eye_outer: Coordinate2D,
    pub nose: Coordinate2D,
}

impl FaceLandmark {
    /// from_points builds the named view from points in model index order.
    ///
    /// Returns `None` when fewer than five points are given.
    pub fn from_points(points: &[Point2D]) -> Option<Self> {
        if points.len() < LANDMARK_COUNT {
            return None;
        }
        Some(FaceLandmark {
            left_eye_outer: points[LEFT_EYE_OUTER].into(),
            left_eye_inner: points[LEFT_EYE_INNER].into(),
            right_eye_inner: points[RIGHT_EYE_INNER].into(),
            right_eye_outer: points[RIGHT_EYE_OUTER].into(),
            nose: points[NOSE_TIP].into(),
        })
    }

    /// to_points returns the landmarks in model index order.
    pub fn to_points(&self) -> Vec<Point2D> {
        vec![
            self.left_eye_outer.into(),
            self.left_eye_inner.into(),
            self.right_eye_inner.into(),
            self.right_eye_outer.into(),
            self.nose.into(),
        ]
    }
}
