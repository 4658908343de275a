//! Active liveness challenge: a forced double blink.
//!
//! A static photograph, or a video loop frozen on an open-eyed frame, never
//! produces the ordered `closed → open → closed` eye sequence the session
//! waits for. Holding the eyes shut is a single closure and never advances
//! past the first blink.
//!
//! ```text
//! INIT ─lock─▶ BLINK_1 ─closed─▶ OPEN_1 ─open─▶ BLINK_2 ─closed─▶ PROCESSING
//!                 ▲                                                 │    │
//!                 └──────────────── capture failed ─────────────────┘    │
//!                                                     capture ok ─▶ SUCCESS
//! ```
//!
//! # Threat Coverage
//!
//! - **Blocks:** printed photographs, still images on a screen, frozen video.
//! - **Does not block:** replayed recordings of a real blink.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Init,
    /// Waiting for the first eye closure.
    Blink1,
    /// Waiting for the eyes to reopen after the first closure.
    Open1,
    /// Waiting for the second eye closure.
    Blink2,
    Processing,
    Success,
}

/// User-facing guidance. `Display` is the exact text shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Calibrating,
    PositionFace,
    MoveCloser,
    CenterFace,
    FaceLocked,
    EyesClosed,
    OneMoreBlink,
    Processing,
    Verified,
    CaptureRetry,
    CameraDenied,
    CameraMissing,
    CameraLost,
    ModelsUnavailable,
    Expired,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Instruction::Calibrating => "Calibrating Scanner...",
            Instruction::PositionFace => "Position Face in Frame",
            Instruction::MoveCloser => "Move Closer",
            Instruction::CenterFace => "Center Your Face",
            Instruction::FaceLocked => "Face Locked. Blink 2 times.",
            Instruction::EyesClosed => "Eyes Closed. Open now.",
            Instruction::OneMoreBlink => "Good. One more blink.",
            Instruction::Processing => "Processing Biometrics.",
            Instruction::Verified => "Identity Verified",
            Instruction::CaptureRetry => "Capture blurry. Retrying.",
            Instruction::CameraDenied => "Camera Error: Permission Denied",
            Instruction::CameraMissing => "Camera Error: No Camera Found",
            Instruction::CameraLost => "Camera Error: Stream Interrupted",
            Instruction::ModelsUnavailable => "Face verification unavailable",
            Instruction::Expired => "Session expired. Start again.",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LivenessState,
    pub to: LivenessState,
    pub instruction: Instruction,
}

/// Mutable state of one verification attempt. One per camera stream.
#[derive(Debug, Clone)]
pub struct LivenessSession {
    state: LivenessState,
    blink_count: u8,
    instruction: Instruction,
}

impl Default for LivenessSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessSession {
    pub fn new() -> Self {
        Self {
            state: LivenessState::Init,
            blink_count: 0,
            instruction: Instruction::Calibrating,
        }
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    pub fn blink_count(&self) -> u8 {
        self.blink_count
    }

    pub fn instruction(&self) -> Instruction {
        self.instruction
    }

    pub fn is_complete(&self) -> bool {
        self.state == LivenessState::Success
    }

    /// Feed one eye reading from a frame where the face is centred and close
    /// enough. Readings that do not represent a new transition are ignored.
    pub fn observe(&mut self, eyes_closed: bool) -> Option<Transition> {
        let (to, instruction) = match (self.state, eyes_closed) {
            (LivenessState::Init, _) => (LivenessState::Blink1, Instruction::FaceLocked),
            (LivenessState::Blink1, true) => (LivenessState::Open1, Instruction::EyesClosed),
            (LivenessState::Open1, false) => {
                self.blink_count = 1;
                (LivenessState::Blink2, Instruction::OneMoreBlink)
            }
            (LivenessState::Blink2, true) => {
                self.blink_count = 2;
                (LivenessState::Processing, Instruction::Processing)
            }
            _ => return None,
        };
        Some(self.enter(to, instruction))
    }

    /// Resolve `PROCESSING`. A failed capture restarts the challenge at the
    /// first blink with the counter cleared.
    pub fn finish_capture(&mut self, captured: bool) -> Option<Transition> {
        if self.state != LivenessState::Processing {
            return None;
        }
        if captured {
            Some(self.enter(LivenessState::Success, Instruction::Verified))
        } else {
            self.blink_count = 0;
            Some(self.enter(LivenessState::Blink1, Instruction::CaptureRetry))
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Guidance that does not change the challenge state (placement hints,
    /// camera errors).
    pub(crate) fn set_instruction(&mut self, instruction: Instruction) {
        self.instruction = instruction;
    }

    fn enter(&mut self, to: LivenessState, instruction: Instruction) -> Transition {
        let from = self.state;
        self.state = to;
        self.instruction = instruction;
        tracing::debug!(?from, ?to, blinks = self.blink_count, "liveness transition");
        Transition {
            from,
            to,
            instruction,
        }
    }
}
