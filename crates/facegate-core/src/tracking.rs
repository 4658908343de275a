//! Face placement checks and the tracking overlay drawn over the preview.

use crate::config::ScanConfig;
use crate::types::{
    BoundingBox, FaceDetection, Landmarks, Point, JAW, LEFT_BROW, LEFT_EYE, MOUTH_INNER,
    MOUTH_OUTER, NOSE, RIGHT_BROW, RIGHT_EYE,
};

/// Nose tip, eye corners, mouth corners, chin, bridge.
pub const KEY_NODES: [usize; 9] = [30, 36, 39, 42, 45, 48, 54, 8, 27];

/// Padding between the face box and the tracking corners.
const CORNER_PAD: f32 = 20.0;
/// Length of each arm of a tracking corner.
const CORNER_ARM: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    TooFar,
    OffCenter,
    Locked,
}

/// Size is checked before centring: a distant face gets "move closer" even
/// when it is also off-centre. Both bounds are inclusive: a box exactly at the
/// minimum ratio is close enough, and a centre exactly at the tolerance is
/// still centred.
pub fn assess_placement(
    bbox: &BoundingBox,
    frame_width: u32,
    frame_height: u32,
    config: &ScanConfig,
) -> Placement {
    let fw = frame_width as f32;
    let fh = frame_height as f32;

    if bbox.width < fw * config.min_face_ratio {
        return Placement::TooFar;
    }

    let center = bbox.center();
    let centred_x = (center.x - fw / 2.0).abs() <= fw * config.center_tolerance;
    let centred_y = (center.y - fh / 2.0).abs() <= fh * config.center_tolerance;
    if !(centred_x && centred_y) {
        return Placement::OffCenter;
    }

    Placement::Locked
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub closed: bool,
}

/// Vector description of one frame's tracking overlay, in frame pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Landmark mesh: jaw, brows, nose, eyes, outer and inner mouth.
    pub mesh: Vec<Polyline>,
    pub nodes: Vec<Point>,
    /// Four L-shaped corner marks around the padded face box.
    pub corners: [[Point; 3]; 4],
}

impl Overlay {
    pub fn for_face(face: &FaceDetection, landmarks: &Landmarks) -> Self {
        let mesh = [
            (JAW, false),
            (RIGHT_BROW, false),
            (LEFT_BROW, false),
            (NOSE, false),
            (LEFT_EYE, true),
            (RIGHT_EYE, true),
            (MOUTH_OUTER, true),
            (MOUTH_INNER, true),
        ]
        .into_iter()
        .map(|(range, closed)| Polyline {
            points: landmarks.region(range).unwrap_or_default().to_vec(),
            closed,
        })
        .collect();

        let points = landmarks.points();
        let nodes = KEY_NODES.iter().map(|&i| points[i]).collect();

        Self {
            mesh,
            nodes,
            corners: corners(&face.bbox),
        }
    }
}

fn corners(bbox: &BoundingBox) -> [[Point; 3]; 4] {
    let x = bbox.x - CORNER_PAD;
    let y = bbox.y - CORNER_PAD;
    let w = bbox.width + CORNER_PAD * 2.0;
    let h = bbox.height + CORNER_PAD * 2.0;
    let l = CORNER_ARM;

    [
        // top left
        [Point::new(x, y + l), Point::new(x, y), Point::new(x + l, y)],
        // top right
        [
            Point::new(x + w - l, y),
            Point::new(x + w, y),
            Point::new(x + w, y + l),
        ],
        // bottom right
        [
            Point::new(x + w, y + h - l),
            Point::new(x + w, y + h),
            Point::new(x + w - l, y + h),
        ],
        // bottom left
        [
            Point::new(x + l, y + h),
            Point::new(x, y + h),
            Point::new(x, y + h - l),
        ],
    ]
}

/// Rendering seam for the preview overlay.
pub trait OverlaySink: Send {
    fn draw(&mut self, overlay: &Overlay);
    fn clear(&mut self);
}

/// Overlay sink for headless scans.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOverlay;

impl OverlaySink for NullOverlay {
    fn draw(&mut self, _overlay: &Overlay) {}
    fn clear(&mut self) {}
}
