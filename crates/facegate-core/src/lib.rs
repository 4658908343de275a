//! facegate-core: face liveness scan and descriptor matching.
//!
//! A scan locks onto a centred face, runs a forced double-blink challenge,
//! and captures a snapshot plus a 128-value face descriptor from the frame
//! that completed the challenge. Descriptors are compared by Euclidean
//! distance. The vision models, camera, and preview rendering are injected
//! through [`VisionBackend`], [`FrameSource`], and [`OverlaySink`].

pub mod config;
pub mod descriptor;
pub mod extract;
pub mod geometry;
pub mod liveness;
pub mod session;
pub mod tracking;
pub mod types;
pub mod vision;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ScanConfig;
pub use descriptor::{matches, Descriptor, DescriptorError, EuclideanMatcher, MatchResult};
pub use extract::extract_descriptor;
pub use liveness::{Instruction, LivenessSession, LivenessState};
pub use session::{spawn_scan, CameraError, FrameSource, ScanError, ScanEvent, ScanHandle, Scanner};
pub use tracking::{NullOverlay, Overlay, OverlaySink};
pub use types::{BoundingBox, CapturedIdentity, FaceDetection, Frame, Landmarks, Point};
pub use vision::{VisionBackend, VisionError};
