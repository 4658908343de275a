//! The vision capability the scan depends on.
//!
//! Concrete backends (detector, landmark predictor, descriptor encoder) are
//! supplied by the host. Every call site in this crate converts a
//! [`VisionError`] into a no-face, retry, or `None` outcome. A backend whose
//! models never loaded reports it through [`VisionBackend::is_ready`], and a
//! scan refuses to start against it.

use thiserror::Error;

use crate::descriptor::Descriptor;
use crate::types::{FaceDetection, Frame, Landmarks};

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("models not loaded")]
    NotReady,
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

pub trait VisionBackend: Send {
    /// Whether the detector, landmark and descriptor models are loaded.
    /// Hosts backed by a model loader return its readiness here.
    fn is_ready(&self) -> bool {
        true
    }

    /// Most confident single face at or above `min_confidence`, if any.
    fn detect_face(
        &mut self,
        frame: &Frame,
        min_confidence: f32,
    ) -> Result<Option<FaceDetection>, VisionError>;

    fn detect_landmarks(
        &mut self,
        frame: &Frame,
        face: &FaceDetection,
    ) -> Result<Landmarks, VisionError>;

    fn compute_descriptor(
        &mut self,
        frame: &Frame,
        face: &FaceDetection,
        landmarks: &Landmarks,
    ) -> Result<Descriptor, VisionError>;
}
