//! Scripted fakes for the vision and overlay seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;

use crate::descriptor::{Descriptor, DESCRIPTOR_DIM};
use crate::tracking::{Overlay, OverlaySink};
use crate::types::{BoundingBox, FaceDetection, Frame, Landmarks, Point, LANDMARK_COUNT};
use crate::vision::{VisionBackend, VisionError};

pub(crate) const FRAME_W: u32 = 640;
pub(crate) const FRAME_H: u32 = 480;

pub(crate) fn frame(sequence: u64) -> Frame {
    Frame::new(sequence, RgbImage::new(FRAME_W, FRAME_H))
}

#[derive(Debug, Clone)]
pub(crate) struct FakeFace {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub eyes_closed: bool,
    pub landmarks_fail: bool,
    pub descriptor_fails: bool,
}

impl FakeFace {
    /// Centred 200 px face on a 640x480 frame.
    pub fn centred(eyes_closed: bool) -> Self {
        Self {
            bbox: BoundingBox {
                x: 220.0,
                y: 140.0,
                width: 200.0,
                height: 200.0,
            },
            confidence: 0.95,
            eyes_closed,
            landmarks_fail: false,
            descriptor_fails: false,
        }
    }

    pub fn with_bbox(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.bbox = BoundingBox {
            x,
            y,
            width,
            height,
        };
        self
    }
}

pub(crate) fn fake_descriptor() -> Descriptor {
    Descriptor::new(
        (0..DESCRIPTOR_DIM)
            .map(|i| (i as f32 * 0.1).sin() * 0.2)
            .collect(),
    )
    .unwrap()
}

fn eye(origin: Point, closed: bool) -> [Point; 6] {
    // width 30; opening 15 -> EAR 0.5, opening 3 -> EAR 0.1
    let half = if closed { 1.5 } else { 7.5 };
    [
        Point::new(origin.x, origin.y),
        Point::new(origin.x + 10.0, origin.y - half),
        Point::new(origin.x + 20.0, origin.y - half),
        Point::new(origin.x + 30.0, origin.y),
        Point::new(origin.x + 20.0, origin.y + half),
        Point::new(origin.x + 10.0, origin.y + half),
    ]
}

#[derive(Debug, Default)]
pub(crate) struct CallLog {
    pub detect: AtomicUsize,
    pub landmarks: AtomicUsize,
    pub descriptor: AtomicUsize,
}

impl CallLog {
    pub fn detect_calls(&self) -> usize {
        self.detect.load(Ordering::SeqCst)
    }

    pub fn descriptor_calls(&self) -> usize {
        self.descriptor.load(Ordering::SeqCst)
    }

    pub fn landmark_calls(&self) -> usize {
        self.landmarks.load(Ordering::SeqCst)
    }
}

/// Backend whose answer for each frame is looked up by frame sequence.
/// Frames without a script entry have no face.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    script: HashMap<u64, FakeFace>,
    pub fail_detection: bool,
    pub models_missing: bool,
    pub calls: Arc<CallLog>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_face(mut self, sequence: u64, face: FakeFace) -> Self {
        self.script.insert(sequence, face);
        self
    }

    pub fn with_faces(mut self, faces: impl IntoIterator<Item = (u64, FakeFace)>) -> Self {
        self.script.extend(faces);
        self
    }

    fn face(&self, frame: &Frame) -> Option<&FakeFace> {
        self.script.get(&frame.sequence)
    }
}

impl VisionBackend for FakeBackend {
    fn is_ready(&self) -> bool {
        !self.models_missing
    }

    fn detect_face(
        &mut self,
        frame: &Frame,
        min_confidence: f32,
    ) -> Result<Option<FaceDetection>, VisionError> {
        self.calls.detect.fetch_add(1, Ordering::SeqCst);
        if self.models_missing {
            return Err(VisionError::NotReady);
        }
        if self.fail_detection {
            return Err(VisionError::Inference("detector exploded".into()));
        }
        Ok(self
            .face(frame)
            .filter(|f| f.confidence >= min_confidence)
            .map(|f| FaceDetection {
                bbox: f.bbox,
                confidence: f.confidence,
            }))
    }

    fn detect_landmarks(
        &mut self,
        frame: &Frame,
        face: &FaceDetection,
    ) -> Result<Landmarks, VisionError> {
        self.calls.landmarks.fetch_add(1, Ordering::SeqCst);
        let script = self
            .face(frame)
            .ok_or_else(|| VisionError::InvalidOutput("no scripted face".into()))?;
        if script.landmarks_fail {
            return Err(VisionError::Inference("landmarks failed".into()));
        }

        let c = face.bbox.center();
        let mut points = vec![c; LANDMARK_COUNT];
        points[36..42].copy_from_slice(&eye(Point::new(c.x - 50.0, c.y - 20.0), script.eyes_closed));
        points[42..48].copy_from_slice(&eye(Point::new(c.x + 20.0, c.y - 20.0), script.eyes_closed));
        Landmarks::new(points).map_err(|e| VisionError::InvalidOutput(e.to_string()))
    }

    fn compute_descriptor(
        &mut self,
        frame: &Frame,
        _face: &FaceDetection,
        _landmarks: &Landmarks,
    ) -> Result<Descriptor, VisionError> {
        self.calls.descriptor.fetch_add(1, Ordering::SeqCst);
        match self.face(frame) {
            Some(f) if !f.descriptor_fails => Ok(fake_descriptor()),
            _ => Err(VisionError::Inference("descriptor failed".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverlayEvent {
    Draw,
    Clear,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingOverlay {
    pub events: Arc<Mutex<Vec<OverlayEvent>>>,
}

impl RecordingOverlay {
    pub fn last(&self) -> Option<OverlayEvent> {
        self.events.lock().unwrap().last().copied()
    }
}

impl OverlaySink for RecordingOverlay {
    fn draw(&mut self, _overlay: &Overlay) {
        self.events.lock().unwrap().push(OverlayEvent::Draw);
    }

    fn clear(&mut self) {
        self.events.lock().unwrap().push(OverlayEvent::Clear);
    }
}
