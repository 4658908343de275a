//! Frame acquisition and the per-frame detection loop.
//!
//! A scan runs on a dedicated OS thread that owns the camera, the vision
//! backend, and the [`LivenessSession`]. Each iteration pulls at most one
//! frame and finishes its detection before the next frame is requested, so
//! slow hardware only slows the loop down. The host talks to the thread
//! through a [`ScanHandle`].
//!
//! The camera is held by a lease whose `Drop` stops the stream. Every way out
//! of the loop (success, cancel, timeout, camera failure, panic, dropped
//! handle) goes through it. A backend without loaded models ends the scan
//! before the camera is ever started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::ScanConfig;
use crate::extract::extract_descriptor;
use crate::geometry::eyes_closed;
use crate::liveness::{Instruction, LivenessSession, LivenessState, Transition};
use crate::tracking::{assess_placement, Overlay, OverlaySink, Placement};
use crate::types::{CapturedIdentity, Frame};
use crate::vision::VisionBackend;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available")]
    NotFound,
    #[error("camera stream failed: {0}")]
    Stream(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("face verification unavailable: models not loaded")]
    ModelsUnavailable,
    #[error("scan cancelled")]
    Cancelled,
    #[error("scan timed out before the liveness challenge completed")]
    TimedOut,
    #[error("failed to spawn scan thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("scan thread exited")]
    ChannelClosed,
}

/// User-visible text for a camera failure.
fn camera_instruction(error: &CameraError) -> Instruction {
    match error {
        CameraError::PermissionDenied => Instruction::CameraDenied,
        CameraError::NotFound => Instruction::CameraMissing,
        CameraError::Stream(_) => Instruction::CameraLost,
    }
}

/// Live camera feed.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), CameraError>;

    /// The next frame if a new one is ready, `None` if the stream has not
    /// produced one since the last call.
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Stop all stream tracks. Must be safe to call more than once.
    fn stop(&mut self);
}

/// Progress notifications published by the scan thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    Instruction(Instruction),
    State {
        state: LivenessState,
        blink_count: u8,
    },
}

/// One iteration of the render loop per [`Scanner::step`] call.
pub struct Scanner<B, O> {
    backend: B,
    overlay: O,
    config: ScanConfig,
    session: LivenessSession,
    events: Vec<ScanEvent>,
}

impl<B: VisionBackend, O: OverlaySink> Scanner<B, O> {
    pub fn new(backend: B, overlay: O, config: ScanConfig) -> Self {
        let session = LivenessSession::new();
        let events = vec![ScanEvent::Instruction(session.instruction())];
        Self {
            backend,
            overlay,
            config,
            session,
            events,
        }
    }

    pub fn session(&self) -> &LivenessSession {
        &self.session
    }

    /// Events produced since the last call.
    pub fn take_events(&mut self) -> Vec<ScanEvent> {
        std::mem::take(&mut self.events)
    }

    /// Process one frame. Returns the captured identity once the liveness
    /// challenge completes; the snapshot and descriptor both come from
    /// `frame`.
    pub fn step(&mut self, frame: &Frame) -> Option<CapturedIdentity> {
        if self.session.is_complete() {
            return None;
        }

        let face = match self.backend.detect_face(frame, self.config.min_confidence) {
            Ok(face) => face,
            Err(e) => {
                tracing::warn!(error = %e, frame = frame.sequence, "detection failed");
                None
            }
        };
        let Some(face) = face else {
            self.overlay.clear();
            self.instruct(Instruction::PositionFace);
            return None;
        };

        match assess_placement(&face.bbox, frame.width(), frame.height(), &self.config) {
            Placement::TooFar => {
                self.overlay.clear();
                self.instruct(Instruction::MoveCloser);
                return None;
            }
            Placement::OffCenter => {
                self.overlay.clear();
                self.instruct(Instruction::CenterFace);
                return None;
            }
            Placement::Locked => {}
        }

        let landmarks = match self.backend.detect_landmarks(frame, &face) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                tracing::warn!(error = %e, frame = frame.sequence, "landmark detection failed");
                self.overlay.clear();
                self.instruct(Instruction::PositionFace);
                return None;
            }
        };

        self.overlay.draw(&Overlay::for_face(&face, &landmarks));

        let closed = eyes_closed(&landmarks, self.config.ear_threshold);
        let Some(transition) = self.session.observe(closed) else {
            self.restore_prompt();
            return None;
        };
        self.note(transition);

        if transition.to == LivenessState::Processing {
            return self.capture(frame);
        }
        None
    }

    fn capture(&mut self, frame: &Frame) -> Option<CapturedIdentity> {
        let snapshot = match encode_snapshot(frame, self.config.snapshot_quality) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot encoding failed");
                None
            }
        };
        let descriptor = if snapshot.is_some() {
            extract_descriptor(&mut self.backend, frame, &self.config)
        } else {
            None
        };

        match (snapshot, descriptor) {
            (Some(snapshot), Some(descriptor)) => {
                if let Some(t) = self.session.finish_capture(true) {
                    self.note(t);
                }
                tracing::info!(frame = frame.sequence, "liveness verified; identity captured");
                Some(CapturedIdentity {
                    snapshot,
                    descriptor,
                })
            }
            _ => {
                if let Some(t) = self.session.finish_capture(false) {
                    self.note(t);
                }
                tracing::info!(frame = frame.sequence, "capture rejected; restarting challenge");
                None
            }
        }
    }

    /// Bring back the current step's prompt after a placement hint.
    fn restore_prompt(&mut self) {
        let hint = matches!(
            self.session.instruction(),
            Instruction::PositionFace | Instruction::MoveCloser | Instruction::CenterFace
        );
        if !hint {
            return;
        }
        let prompt = match self.session.state() {
            LivenessState::Init => Instruction::Calibrating,
            LivenessState::Blink1 => Instruction::FaceLocked,
            LivenessState::Open1 => Instruction::EyesClosed,
            LivenessState::Blink2 => Instruction::OneMoreBlink,
            LivenessState::Processing => Instruction::Processing,
            LivenessState::Success => Instruction::Verified,
        };
        self.instruct(prompt);
    }

    fn instruct(&mut self, instruction: Instruction) {
        if self.session.instruction() != instruction {
            self.session.set_instruction(instruction);
            self.events.push(ScanEvent::Instruction(instruction));
        }
    }

    fn note(&mut self, transition: Transition) {
        self.events.push(ScanEvent::State {
            state: transition.to,
            blink_count: self.session.blink_count(),
        });
        self.events.push(ScanEvent::Instruction(transition.instruction));
    }
}

fn encode_snapshot(frame: &Frame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&frame.image)?;
    Ok(buf)
}

/// Exclusive hold on the camera. Dropping it stops the stream.
struct CameraLease<S: FrameSource> {
    source: S,
}

impl<S: FrameSource> CameraLease<S> {
    fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: FrameSource> std::ops::Deref for CameraLease<S> {
    type Target = S;
    fn deref(&self) -> &S {
        &self.source
    }
}

impl<S: FrameSource> std::ops::DerefMut for CameraLease<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: FrameSource> Drop for CameraLease<S> {
    fn drop(&mut self) {
        self.source.stop();
        tracing::info!("camera released");
    }
}

/// Host side of a running scan. Dropping the handle cancels the scan.
pub struct ScanHandle {
    cancel: Arc<AtomicBool>,
    events: mpsc::UnboundedReceiver<ScanEvent>,
    outcome: Option<oneshot::Receiver<Result<CapturedIdentity, ScanError>>>,
}

impl ScanHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Next progress event, or `None` once the scan thread has exited.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    pub async fn wait(mut self) -> Result<CapturedIdentity, ScanError> {
        let outcome = self.outcome.take().ok_or(ScanError::ChannelClosed)?;
        outcome.await.map_err(|_| ScanError::ChannelClosed)?
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Start a liveness scan on its own thread.
pub fn spawn_scan<S, B, O>(
    source: S,
    backend: B,
    overlay: O,
    config: ScanConfig,
) -> Result<ScanHandle, ScanError>
where
    S: FrameSource + 'static,
    B: VisionBackend + 'static,
    O: OverlaySink + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let flag = cancel.clone();
    std::thread::Builder::new()
        .name("facegate-scan".into())
        .spawn(move || {
            tracing::info!("scan thread started");
            let scanner = Scanner::new(backend, overlay, config);
            let result = run_scan(source, scanner, &flag, &event_tx);
            match &result {
                Ok(_) => tracing::info!("scan complete"),
                Err(e) => tracing::info!(reason = %e, "scan ended without capture"),
            }
            let _ = outcome_tx.send(result);
        })
        .map_err(ScanError::Spawn)?;

    Ok(ScanHandle {
        cancel,
        events: event_rx,
        outcome: Some(outcome_rx),
    })
}

fn run_scan<S, B, O>(
    source: S,
    mut scanner: Scanner<B, O>,
    cancel: &AtomicBool,
    events: &mpsc::UnboundedSender<ScanEvent>,
) -> Result<CapturedIdentity, ScanError>
where
    S: FrameSource,
    B: VisionBackend,
    O: OverlaySink,
{
    if !scanner.backend.is_ready() {
        tracing::error!("face models unavailable; camera not started");
        scanner.instruct(Instruction::ModelsUnavailable);
        publish(&mut scanner, events);
        return Err(ScanError::ModelsUnavailable);
    }

    let mut camera = CameraLease::new(source);
    let result = drive(&mut camera, &mut scanner, cancel, events);
    scanner.overlay.clear();
    drop(camera);
    result
}

fn drive<S, B, O>(
    camera: &mut CameraLease<S>,
    scanner: &mut Scanner<B, O>,
    cancel: &AtomicBool,
    events: &mpsc::UnboundedSender<ScanEvent>,
) -> Result<CapturedIdentity, ScanError>
where
    S: FrameSource,
    B: VisionBackend,
    O: OverlaySink,
{
    if let Err(e) = camera.start() {
        tracing::error!(error = %e, "camera start failed");
        scanner.instruct(camera_instruction(&e));
        publish(scanner, events);
        return Err(e.into());
    }
    publish(scanner, events);

    let started = Instant::now();
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Err(ScanError::Cancelled);
        }
        if let Some(limit) = scanner.config.session_timeout {
            if started.elapsed() >= limit {
                tracing::warn!(secs = limit.as_secs_f32(), "scan session expired");
                scanner.instruct(Instruction::Expired);
                publish(scanner, events);
                return Err(ScanError::TimedOut);
            }
        }

        let frame = match camera.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                std::thread::sleep(scanner.config.frame_interval);
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "camera stream failed");
                scanner.instruct(camera_instruction(&e));
                publish(scanner, events);
                return Err(e.into());
            }
        };

        let captured = scanner.step(&frame);
        publish(scanner, events);
        if let Some(identity) = captured {
            return Ok(identity);
        }
    }
}

fn publish<B, O>(scanner: &mut Scanner<B, O>, events: &mpsc::UnboundedSender<ScanEvent>)
where
    B: VisionBackend,
    O: OverlaySink,
{
    for event in scanner.take_events() {
        // The host may have stopped listening; the scan still runs to its end.
        let _ = events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        fake_descriptor, frame, FakeBackend, FakeFace, OverlayEvent, RecordingOverlay,
    };
    use std::collections::VecDeque;
    use std::time::Duration;

    fn scanner(backend: FakeBackend) -> Scanner<FakeBackend, RecordingOverlay> {
        Scanner::new(backend, RecordingOverlay::default(), ScanConfig::default())
    }

    fn scripted(eyes: &[bool]) -> FakeBackend {
        FakeBackend::new().with_faces(
            eyes.iter()
                .enumerate()
                .map(|(i, &closed)| (i as u64 + 1, FakeFace::centred(closed))),
        )
    }

    #[test]
    fn test_no_face_keeps_init() {
        let mut s = scanner(FakeBackend::new());
        for seq in 1..=10 {
            assert!(s.step(&frame(seq)).is_none());
            assert_eq!(s.session().instruction().to_string(), "Position Face in Frame");
        }
        assert_eq!(s.session().state(), LivenessState::Init);
        assert_eq!(s.overlay.last(), Some(OverlayEvent::Clear));
    }

    #[test]
    fn test_double_blink_sequence_captures_identity() {
        // open, closed, closed, open, open, closed
        let mut s = scanner(scripted(&[false, true, true, false, false, true]));

        for seq in 1..=5 {
            assert!(s.step(&frame(seq)).is_none(), "frame {seq}");
        }
        assert_eq!(s.session().state(), LivenessState::Blink2);
        assert_eq!(s.session().blink_count(), 1);

        let identity = s.step(&frame(6)).expect("identity after 6th frame");
        assert_eq!(s.session().state(), LivenessState::Success);
        assert_eq!(s.session().blink_count(), 2);
        assert_eq!(s.session().instruction().to_string(), "Identity Verified");
        assert_eq!(identity.descriptor, fake_descriptor());
        assert_eq!(&identity.snapshot[..2], &[0xFF, 0xD8]);

        let events = s.take_events();
        assert!(events.contains(&ScanEvent::State {
            state: LivenessState::Processing,
            blink_count: 2
        }));
        assert_eq!(
            events.last(),
            Some(&ScanEvent::Instruction(Instruction::Verified))
        );
    }

    #[test]
    fn test_distant_face_never_advances() {
        let far = FakeFace::centred(true).with_bbox(270.0, 190.0, 100.0, 100.0);
        let backend = FakeBackend::new().with_faces((1..=5).map(|seq| (seq, far.clone())));
        let mut s = scanner(backend);
        for seq in 1..=5 {
            s.step(&frame(seq));
        }
        assert_eq!(s.session().state(), LivenessState::Init);
        assert_eq!(s.session().instruction().to_string(), "Move Closer");
    }

    #[test]
    fn test_off_center_face_never_advances() {
        let side = FakeFace::centred(false).with_bbox(0.0, 140.0, 200.0, 200.0);
        let mut s = scanner(FakeBackend::new().with_face(1, side));
        s.step(&frame(1));
        assert_eq!(s.session().state(), LivenessState::Init);
        assert_eq!(s.session().instruction().to_string(), "Center Your Face");
        assert_eq!(s.overlay.last(), Some(OverlayEvent::Clear));
    }

    #[test]
    fn test_locked_face_draws_overlay() {
        let mut s = scanner(scripted(&[false]));
        s.step(&frame(1));
        assert_eq!(s.overlay.last(), Some(OverlayEvent::Draw));
        assert_eq!(s.session().instruction().to_string(), "Face Locked. Blink 2 times.");
    }

    #[test]
    fn test_prompt_restored_after_face_lost() {
        // lock, closed, (no face), closed
        let backend = FakeBackend::new()
            .with_face(1, FakeFace::centred(false))
            .with_face(2, FakeFace::centred(true))
            .with_face(4, FakeFace::centred(true));
        let mut s = scanner(backend);
        s.step(&frame(1));
        s.step(&frame(2));
        s.step(&frame(3));
        assert_eq!(s.session().instruction(), Instruction::PositionFace);
        s.step(&frame(4));
        assert_eq!(s.session().state(), LivenessState::Open1);
        assert_eq!(s.session().instruction(), Instruction::EyesClosed);
    }

    #[test]
    fn test_blurry_capture_retries_from_first_blink() {
        let mut faces: Vec<(u64, FakeFace)> = [false, true, false, true]
            .iter()
            .enumerate()
            .map(|(i, &c)| (i as u64 + 1, FakeFace::centred(c)))
            .collect();
        // capture frame drifts too far for the absolute width gate
        faces[3].1 = FakeFace::centred(true).with_bbox(260.0, 180.0, 170.0, 170.0);
        let mut s = Scanner::new(
            FakeBackend::new().with_faces(faces),
            RecordingOverlay::default(),
            ScanConfig {
                min_face_width_px: 180.0,
                ..ScanConfig::default()
            },
        );

        for seq in 1..=4 {
            assert!(s.step(&frame(seq)).is_none());
        }
        assert_eq!(s.session().state(), LivenessState::Blink1);
        assert_eq!(s.session().blink_count(), 0);
        assert_eq!(s.session().instruction().to_string(), "Capture blurry. Retrying.");
    }

    #[test]
    fn test_descriptor_failure_then_success() {
        let mut failing = FakeFace::centred(true);
        failing.descriptor_fails = true;
        let backend = scripted(&[false, true, false])
            .with_face(4, failing)
            .with_faces([
                (5, FakeFace::centred(true)),
                (6, FakeFace::centred(false)),
                (7, FakeFace::centred(true)),
            ]);
        let mut s = scanner(backend);

        for seq in 1..=4 {
            assert!(s.step(&frame(seq)).is_none());
        }
        assert_eq!(s.session().state(), LivenessState::Blink1);

        assert!(s.step(&frame(5)).is_none());
        assert!(s.step(&frame(6)).is_none());
        assert!(s.step(&frame(7)).is_some());
        assert!(s.session().is_complete());
    }

    #[test]
    fn test_detection_errors_are_absorbed() {
        let mut backend = scripted(&[false]);
        backend.fail_detection = true;
        let mut s = scanner(backend);
        assert!(s.step(&frame(1)).is_none());
        assert_eq!(s.session().state(), LivenessState::Init);
        assert_eq!(s.session().instruction(), Instruction::PositionFace);
    }

    // ── Threaded loop ─────────────────────────────────────────────────────────

    #[derive(Default)]
    struct ScriptedSource {
        frames: VecDeque<Frame>,
        fail_start: bool,
        /// Fail the stream once the scripted frames run out.
        fail_when_drained: bool,
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn with_frames(count: u64) -> Self {
            Self {
                frames: (1..=count).map(frame).collect(),
                ..Self::default()
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn start(&mut self) -> Result<(), CameraError> {
            self.started.store(true, Ordering::SeqCst);
            if self.fail_start {
                return Err(CameraError::PermissionDenied);
            }
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            match self.frames.pop_front() {
                None if self.fail_when_drained => {
                    Err(CameraError::Stream("device unplugged".into()))
                }
                next => Ok(next),
            }
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            frame_interval: Duration::from_millis(1),
            ..ScanConfig::default()
        }
    }

    async fn drain(handle: &mut ScanHandle) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_spawned_scan_succeeds_and_releases_camera() {
        let source = ScriptedSource::with_frames(6);
        let stopped = source.stopped.clone();
        let backend = scripted(&[false, true, true, false, false, true]);
        let overlay = RecordingOverlay::default();

        let mut handle = spawn_scan(source, backend, overlay.clone(), fast_config()).unwrap();
        let events = drain(&mut handle).await;
        let identity = handle.wait().await.unwrap();

        assert_eq!(identity.descriptor, fake_descriptor());
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(overlay.last(), Some(OverlayEvent::Clear));
        assert_eq!(events.first(), Some(&ScanEvent::Instruction(Instruction::Calibrating)));
        assert!(events.contains(&ScanEvent::State {
            state: LivenessState::Success,
            blink_count: 2
        }));
    }

    #[tokio::test]
    async fn test_cancel_releases_camera() {
        let source = ScriptedSource::default();
        let stopped = source.stopped.clone();
        let handle = spawn_scan(
            source,
            FakeBackend::new(),
            RecordingOverlay::default(),
            ScanConfig {
                session_timeout: None,
                ..fast_config()
            },
        )
        .unwrap();

        handle.cancel();
        assert!(matches!(handle.wait().await, Err(ScanError::Cancelled)));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_camera() {
        let source = ScriptedSource::default();
        let stopped = source.stopped.clone();
        let handle = spawn_scan(
            source,
            FakeBackend::new(),
            RecordingOverlay::default(),
            ScanConfig {
                session_timeout: None,
                ..fast_config()
            },
        )
        .unwrap();
        drop(handle);

        for _ in 0..200 {
            if stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_session_timeout_releases_camera() {
        let source = ScriptedSource::default();
        let stopped = source.stopped.clone();
        let mut handle = spawn_scan(
            source,
            FakeBackend::new(),
            RecordingOverlay::default(),
            ScanConfig {
                session_timeout: Some(Duration::from_millis(30)),
                ..fast_config()
            },
        )
        .unwrap();

        let events = drain(&mut handle).await;
        assert!(matches!(handle.wait().await, Err(ScanError::TimedOut)));
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(events.last(), Some(&ScanEvent::Instruction(Instruction::Expired)));
    }

    #[tokio::test]
    async fn test_camera_denied() {
        let source = ScriptedSource {
            fail_start: true,
            ..ScriptedSource::default()
        };
        let stopped = source.stopped.clone();
        let mut handle = spawn_scan(
            source,
            FakeBackend::new(),
            RecordingOverlay::default(),
            fast_config(),
        )
        .unwrap();

        let events = drain(&mut handle).await;
        assert!(matches!(
            handle.wait().await,
            Err(ScanError::Camera(CameraError::PermissionDenied))
        ));
        assert!(stopped.load(Ordering::SeqCst));
        assert!(events.contains(&ScanEvent::Instruction(Instruction::CameraDenied)));
    }

    #[tokio::test]
    async fn test_stream_failure_is_surfaced_and_releases_camera() {
        let source = ScriptedSource {
            fail_when_drained: true,
            ..ScriptedSource::with_frames(2)
        };
        let stopped = source.stopped.clone();
        let backend = scripted(&[false, true]);
        let mut handle = spawn_scan(
            source,
            backend,
            RecordingOverlay::default(),
            fast_config(),
        )
        .unwrap();

        let events = drain(&mut handle).await;
        assert!(matches!(
            handle.wait().await,
            Err(ScanError::Camera(CameraError::Stream(_)))
        ));
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(events.last(), Some(&ScanEvent::Instruction(Instruction::CameraLost)));
        assert_eq!(
            Instruction::CameraLost.to_string(),
            "Camera Error: Stream Interrupted"
        );
    }

    #[tokio::test]
    async fn test_scan_refused_when_models_failed_to_load() {
        use facegate_models::{HttpFetcher, ModelLoader, ModelSource};

        let missing = std::env::temp_dir().join(format!(
            "facegate-core-no-models-{}",
            std::process::id()
        ));
        let loader = ModelLoader::new(vec![ModelSource::Local(missing)], Arc::new(HttpFetcher));
        assert!(!loader.ensure_ready().await);

        let source = ScriptedSource::with_frames(6);
        let started = source.started.clone();
        let mut backend = scripted(&[false, true, true, false, false, true]);
        backend.models_missing = !loader.is_ready();
        let calls = backend.calls.clone();

        let mut handle = spawn_scan(
            source,
            backend,
            RecordingOverlay::default(),
            fast_config(),
        )
        .unwrap();

        let events = drain(&mut handle).await;
        assert!(matches!(handle.wait().await, Err(ScanError::ModelsUnavailable)));
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(calls.detect_calls(), 0);
        assert_eq!(
            events.last(),
            Some(&ScanEvent::Instruction(Instruction::ModelsUnavailable))
        );
        assert_eq!(
            Instruction::ModelsUnavailable.to_string(),
            "Face verification unavailable"
        );
    }
}
