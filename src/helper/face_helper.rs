use nalgebra::distance;
use crate::utils::coordinate::{
    FaceLandmark, Point2D, LANDMARK_COUNT, LEFT_EYE_INNER, LEFT_EYE_OUTER, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
};

/// EAR reported for a 2-point eye whose corners are distinct.
const APPROX_OPEN_EAR: f64 = 0.3;

/// EAR assumed when the eye has too few points to measure.
const DEFAULT_OPEN_EAR: f64 = 0.5;

/// HeadPose holds the normalized nose offsets of a single 5-point landmark set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
}

/// calculate_eye_width returns the width of the eye in pixels.
///
/// # Arguments
/// * `eye` - two corner points (5-point model) or six contour points (68-point model)
///
/// # Returns
/// * `f64` - 0 when the point count is not supported
pub fn calculate_eye_width(eye: &[Point2D]) -> f64 {
    match eye.len() {
        2 => distance(&eye[0], &eye[1]),
        6 => distance(&eye[0], &eye[3]),
        _ => 0.0,
    }
}

/// calculate_eye_aspect_ratio computes the EAR from eye landmarks.
///
/// With six contour points this is `(|p1-p5| + |p2-p4|) / (2 |p0-p3|)`.
/// The 5-point model only gives the corners, so a fixed open-eye value is
/// returned whenever the corners are distinct.
///
/// # Arguments
/// * `eye` - landmark points of a single eye
///
/// # Returns
/// * `f64`
pub fn calculate_eye_aspect_ratio(eye: &[Point2D]) -> f64 {
    match eye.len() {
        0 | 1 => DEFAULT_OPEN_EAR,
        2 => {
            if distance(&eye[0], &eye[1]) > 0.0 {
                APPROX_OPEN_EAR
            } else {
                0.0
            }
        }
        6 => {
            let v1 = distance(&eye[1], &eye[5]);
            let v2 = distance(&eye[2], &eye[4]);
            let h = distance(&eye[0], &eye[3]);
            if h == 0.0 {
                return 0.0;
            }
            (v1 + v2) / (2.0 * h)
        }
        _ => APPROX_OPEN_EAR,
    }
}

/// eye_aspect_ratio returns the mean EAR of both eyes of a 5-point landmark set,
/// or 0 when the landmarks are incomplete.
pub fn eye_aspect_ratio(landmarks: &[Point2D]) -> f64 {
    if landmarks.len() < LANDMARK_COUNT {
        return 0.0;
    }
    let left = calculate_eye_aspect_ratio(&landmarks[LEFT_EYE_OUTER..=LEFT_EYE_INNER]);
    let right = calculate_eye_aspect_ratio(&landmarks[RIGHT_EYE_INNER..=RIGHT_EYE_OUTER]);
    (left + right) / 2.0
}

/// mean_eye_width returns the mean corner-to-corner width of both eyes of a
/// 5-point landmark set, or `None` when the landmarks are incomplete.
pub fn mean_eye_width(landmarks: &[Point2D]) -> Option<f64> {
    if landmarks.len() < LANDMARK_COUNT {
        return None;
    }
    let left = calculate_eye_width(&landmarks[LEFT_EYE_OUTER..=LEFT_EYE_INNER]);
    let right = calculate_eye_width(&landmarks[RIGHT_EYE_INNER..=RIGHT_EYE_OUTER]);
    Some((left + right) / 2.0)
}

/// head_pose computes the yaw and pitch ratios of a 5-point landmark set.
///
/// Yaw is the nose position along the inter-eye baseline, pitch the nose
/// offset below the eye midline; both are normalized by the eye separation.
///
/// # Arguments
/// * `landmarks` - points in model index order
///
/// # Returns
/// * `Option<HeadPose>` - `None` when landmarks are missing or the eyes are not
///   ordered left-to-right in the image
pub fn head_pose(landmarks: &[Point2D]) -> Option<HeadPose> {
    let face = FaceLandmark::from_points(landmarks)?;

    let viewer_right = nalgebra::center(&Point2D::from(face.left_eye_outer), &Point2D::from(face.left_eye_inner));
    let viewer_left = nalgebra::center(&Point2D::from(face.right_eye_inner), &Point2D::from(face.right_eye_outer));
    let nose = Point2D::from(face.nose);

    let eye_dist = viewer_right.x - viewer_left.x;
    if eye_dist <= 0.0 {
        return None;
    }

    let eye_mid_y = (viewer_right.y + viewer_left.y) / 2.0;
    Some(HeadPose {
        yaw: (nose.x - viewer_left.x) / eye_dist,
        pitch: (nose.y - eye_mid_y) / eye_dist,
    })
}

/// blink_slope_threshold picks the EAR drop per frame that counts as a blink
/// for eyes of the given mean width in pixels.
pub fn blink_slope_threshold(mean_width: f64) -> f64 {
    if mean_width <= 0.0 {
        return -0.05;
    }
    let eye_height_slope = if mean_width <= 23.0 {
        -0.75
    } else if mean_width <= 38.0 {
        -2.75
    } else if mean_width <= 54.0 {
        -4.75
    } else {
        -5.75
    };
    eye_height_slope / mean_width
}
