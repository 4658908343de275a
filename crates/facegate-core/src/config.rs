use std::time::Duration;

use crate::geometry::DEFAULT_EAR_THRESHOLD;

/// Tuning for a liveness scan. Defaults follow the calibrated values of the
/// reference web client; none of them are derived per user.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Minimum detector confidence, used for tracking and for capture.
    pub min_confidence: f32,
    /// Mean eye aspect ratio below which the eyes count as closed.
    pub ear_threshold: f32,
    /// Face box width must be at least this fraction of the frame width.
    pub min_face_ratio: f32,
    /// Allowed deviation of the box centre from the frame centre, as a
    /// fraction of the frame dimension on each axis.
    pub center_tolerance: f32,
    /// Absolute face box width (pixels) required at capture time.
    pub min_face_width_px: f32,
    /// Camera hold limit for one scan. `None` disables expiry.
    pub session_timeout: Option<Duration>,
    /// Sleep between polls when the source has no new frame.
    pub frame_interval: Duration,
    /// JPEG quality of the captured snapshot (1-100).
    pub snapshot_quality: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            min_face_ratio: 0.25,
            center_tolerance: 0.20,
            min_face_width_px: 100.0,
            session_timeout: Some(Duration::from_secs(60)),
            frame_interval: Duration::from_millis(16),
            snapshot_quality: 90,
        }
    }
}
