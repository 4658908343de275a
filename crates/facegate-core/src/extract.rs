use crate::config::ScanConfig;
use crate::descriptor::Descriptor;
use crate::types::Frame;
use crate::vision::{VisionBackend, VisionError};

/// Re-detect the face on `frame` and compute its descriptor.
///
/// The absolute width gate catches faces that drifted away between the
/// live-loop size check and this capture. Returns `None` on any failure,
/// including a backend whose models are not loaded; backend errors are
/// logged and swallowed.
pub fn extract_descriptor<B: VisionBackend + ?Sized>(
    backend: &mut B,
    frame: &Frame,
    config: &ScanConfig,
) -> Option<Descriptor> {
    if !backend.is_ready() {
        tracing::warn!(frame = frame.sequence, "capture: {}", VisionError::NotReady);
        return None;
    }

    let face = match backend.detect_face(frame, config.min_confidence) {
        Ok(Some(face)) => face,
        Ok(None) => {
            tracing::debug!(frame = frame.sequence, "capture: no face");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, frame = frame.sequence, "capture: detection failed");
            return None;
        }
    };

    if face.bbox.width < config.min_face_width_px {
        tracing::debug!(
            width = face.bbox.width,
            min = config.min_face_width_px,
            "capture: face too small"
        );
        return None;
    }

    let landmarks = match backend.detect_landmarks(frame, &face) {
        Ok(landmarks) => landmarks,
        Err(e) => {
            tracing::warn!(error = %e, "capture: landmark detection failed");
            return None;
        }
    };

    match backend.compute_descriptor(frame, &face, &landmarks) {
        Ok(descriptor) => {
            tracing::debug!(
                confidence = face.confidence,
                width = face.bbox.width,
                "capture: descriptor extracted"
            );
            Some(descriptor)
        }
        Err(e) => {
            tracing::warn!(error = %e, "capture: descriptor computation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_descriptor, frame, FakeBackend, FakeFace};

    #[test]
    fn test_extracts_from_good_frame() {
        let mut backend = FakeBackend::new().with_face(1, FakeFace::centred(false));
        let d = extract_descriptor(&mut backend, &frame(1), &ScanConfig::default());
        assert_eq!(d, Some(fake_descriptor()));
    }

    #[test]
    fn test_no_face_returns_none() {
        let mut backend = FakeBackend::new();
        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_none());
    }

    #[test]
    fn test_low_confidence_returns_none() {
        let mut face = FakeFace::centred(false);
        face.confidence = 0.3;
        let mut backend = FakeBackend::new().with_face(1, face);
        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_none());
    }

    #[test]
    fn test_undersized_face_returns_none_without_further_work() {
        let face = FakeFace::centred(false).with_bbox(270.0, 190.0, 99.0, 99.0);
        let mut backend = FakeBackend::new().with_face(1, face);
        let calls = backend.calls.clone();

        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_none());
        assert_eq!(calls.landmark_calls(), 0);
        assert_eq!(calls.descriptor_calls(), 0);
    }

    #[test]
    fn test_width_at_minimum_is_accepted() {
        let face = FakeFace::centred(false).with_bbox(270.0, 190.0, 100.0, 100.0);
        let mut backend = FakeBackend::new().with_face(1, face);
        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_some());
    }

    #[test]
    fn test_models_not_loaded_returns_none_without_backend_calls() {
        let mut backend = FakeBackend::new().with_face(1, FakeFace::centred(false));
        backend.models_missing = true;
        let calls = backend.calls.clone();

        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_none());
        assert_eq!(calls.detect_calls(), 0);
        assert_eq!(calls.descriptor_calls(), 0);
    }

    #[test]
    fn test_backend_errors_return_none() {
        let mut backend = FakeBackend::new().with_face(1, FakeFace::centred(false));
        backend.fail_detection = true;
        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_none());

        let mut face = FakeFace::centred(false);
        face.landmarks_fail = true;
        let mut backend = FakeBackend::new().with_face(1, face);
        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_none());

        let mut face = FakeFace::centred(false);
        face.descriptor_fails = true;
        let mut backend = FakeBackend::new().with_face(1, face);
        assert!(extract_descriptor(&mut backend, &frame(1), &ScanConfig::default()).is_none());
    }
}
