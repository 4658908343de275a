use std::ops::Range;

use image::RgbImage;
use thiserror::Error;

use crate::descriptor::Descriptor;

/// Number of keypoints produced by the 68-point landmark predictor.
pub const LANDMARK_COUNT: usize = 68;

pub const JAW: Range<usize> = 0..17;
pub const RIGHT_BROW: Range<usize> = 17..22;
pub const LEFT_BROW: Range<usize> = 22..27;
pub const NOSE: Range<usize> = 27..36;
pub const LEFT_EYE: Range<usize> = 36..42;
pub const RIGHT_EYE: Range<usize> = 42..48;
pub const MOUTH_OUTER: Range<usize> = 48..60;
pub const MOUTH_INNER: Range<usize> = 60..68;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned face box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A single detected face. Produced per frame and discarded after use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("expected 68 landmarks, got {0}")]
    WrongCount(usize),
}

/// The 68-point facial keypoint set.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    points: [Point; LANDMARK_COUNT],
}

impl Landmarks {
    pub fn new(points: Vec<Point>) -> Result<Self, LandmarkError> {
        let points: [Point; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|rejected: Vec<Point>| LandmarkError::WrongCount(rejected.len()))?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Points in `range`, or `None` if it reaches past the last landmark.
    pub fn region(&self, range: Range<usize>) -> Option<&[Point]> {
        self.points.get(range)
    }

    pub fn left_eye(&self) -> [Point; 6] {
        self.eye(LEFT_EYE.start)
    }

    pub fn right_eye(&self) -> [Point; 6] {
        self.eye(RIGHT_EYE.start)
    }

    fn eye(&self, start: usize) -> [Point; 6] {
        std::array::from_fn(|i| self.points[start + i])
    }
}

/// One RGB camera frame. `sequence` increases by one per frame delivered
/// by the source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self { sequence, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Terminal artifact of a successful liveness scan.
#[derive(Debug, Clone)]
pub struct CapturedIdentity {
    /// JPEG snapshot of the frame the descriptor was computed from.
    pub snapshot: Vec<u8>,
    pub descriptor: Descriptor,
}
