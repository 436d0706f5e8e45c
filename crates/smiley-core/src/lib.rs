//! smiley-core — Smile-triggered capture logic.
//!
//! Holds the data model shared by the daemon and the platform
//! collaborators, the capture state machine, and the read-only
//! snapshot rendered by the presentation layer.

pub mod machine;
pub mod types;
pub mod view;

pub use machine::{
    CaptureStateMachine, CycleOutcome, Rearm, Transition, REARM_COOLDOWN, SMILE_THRESHOLD,
};
pub use types::{
    AlbumHandle, Asset, CameraFacing, CaptureOptions, CaptureState, DetectionEvent, EventError,
    FaceDescriptor, ImageHandle, Notice, Permission, Quality,
};
pub use view::{format_probability, Snapshot};

/// Name of the album every captured photo is filed into.
pub const ALBUM_NAME: &str = "Smiley Cam";
