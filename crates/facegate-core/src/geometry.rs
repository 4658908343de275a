//! Eye-aspect-ratio and descriptor distance.
//!
//! The eye aspect ratio (EAR) compares the vertical opening of an eye to its
//! width using the six 68-point landmarks around it:
//!
//! ```text
//!          p1   p2
//!     p0             p3
//!          p5   p4
//!
//!     EAR = (|p1 - p5| + |p2 - p4|) / (2 * |p0 - p3|)
//! ```
//!
//! An open eye sits around 0.3-0.5; a closed eye drops towards zero.

use crate::types::{Landmarks, Point};

/// Mean EAR below which the eyes are treated as closed.
pub const DEFAULT_EAR_THRESHOLD: f32 = 0.35;

/// Eye aspect ratio of a single eye.
///
/// A degenerate eye with no horizontal span returns `f32::INFINITY`, so a
/// collapsed landmark fit can never be mistaken for a closed eye.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f32 {
    let a = eye[1].distance(&eye[5]);
    let b = eye[2].distance(&eye[4]);
    let c = eye[0].distance(&eye[3]);

    if c <= f32::EPSILON {
        return f32::INFINITY;
    }
    (a + b) / (2.0 * c)
}

/// EAR averaged over both eyes.
pub fn mean_eye_aspect_ratio(landmarks: &Landmarks) -> f32 {
    let left = eye_aspect_ratio(&landmarks.left_eye());
    let right = eye_aspect_ratio(&landmarks.right_eye());
    (left + right) / 2.0
}

pub fn eyes_closed(landmarks: &Landmarks, threshold: f32) -> bool {
    mean_eye_aspect_ratio(landmarks) < threshold
}

/// Euclidean distance between two vectors, or `None` when their lengths
/// differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum();
    Some(sum.sqrt())
}
