//! Smile-triggered capture state machine.
//!
//! Pure and synchronous: it decides, the engine acts. Detach/attach of the
//! detection subscription and the cooldown timer live in the daemon.

use crate::types::{CaptureState, DetectionEvent};
use std::time::Duration;

// --- Capture policy constants ---
/// A primary face must be strictly above this to trigger a capture.
pub const SMILE_THRESHOLD: f64 = 0.7;
/// Delay between a successful save and re-arming.
pub const REARM_COOLDOWN: Duration = Duration::from_millis(2000);

/// What a detection event did to the machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// No effect: empty frame, or the machine is not armed.
    Ignored,
    /// Probability recorded for display, still armed.
    Observed { probability: f64 },
    /// Armed → Captured. The caller must start exactly one capture cycle.
    Triggered { probability: f64 },
}

/// How a capture cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Capture returned no image.
    Empty,
    /// Capture raised an error.
    CaptureFailed,
    /// Storage permission was refused.
    StorageDenied,
    /// Asset or album operation failed.
    SaveFailed,
    /// Photo filed into the album.
    Saved,
}

/// When to return to `Armed` after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearm {
    Immediately,
    After(Duration),
}

impl CycleOutcome {
    /// Re-arm policy per outcome.
    ///
    /// Capture-side outcomes re-arm at once. Every outcome that got as far as
    /// the library waits out the cooldown, failed saves included.
    pub fn rearm(self) -> Rearm {
        match self {
            CycleOutcome::Empty | CycleOutcome::CaptureFailed => Rearm::Immediately,
            CycleOutcome::StorageDenied | CycleOutcome::SaveFailed | CycleOutcome::Saved => {
                Rearm::After(REARM_COOLDOWN)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureStateMachine {
    state: CaptureState,
    /// Last probability shown to the user.
    displayed: f64,
}

impl CaptureStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn displayed_probability(&self) -> f64 {
        self.displayed
    }

    /// Evaluate one detection event.
    ///
    /// Only the first face counts. The display value is updated before the
    /// threshold check, so the triggering probability is what stays on screen
    /// while captured.
    pub fn on_detection(&mut self, event: &DetectionEvent) -> Transition {
        if self.state == CaptureState::Captured {
            return Transition::Ignored;
        }
        let Some(face) = event.primary_face() else {
            return Transition::Ignored;
        };

        let probability = face.smiling_probability;
        self.displayed = probability;

        if probability > SMILE_THRESHOLD {
            self.state = CaptureState::Captured;
            tracing::debug!(probability, "smile threshold crossed");
            Transition::Triggered { probability }
        } else {
            Transition::Observed { probability }
        }
    }

    /// Return to `Armed`. Display keeps the last value.
    pub fn rearm(&mut self) {
        self.state = CaptureState::Armed;
    }
}
