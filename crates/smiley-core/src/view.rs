//! Read-only projection of controller state for the presentation layer.

use crate::types::{CameraFacing, CaptureState, Permission};
use serde::Serialize;

const MSG_LOADING: &str = "Loading";
const MSG_DENIED: &str = "Don't have permission for this";

/// Everything the UI needs to draw one frame of the screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub camera_permission: Permission,
    pub state: CaptureState,
    pub smiling_probability: f64,
    pub camera: CameraFacing,
    /// Photos filed into the album since startup.
    pub saved_photos: u64,
    /// Most recent user-facing notice, rendered with `Display`.
    pub last_notice: Option<String>,
}

impl Snapshot {
    /// Probability readout, e.g. `"72.0%"`.
    pub fn readout(&self) -> String {
        format_probability(self.smiling_probability)
    }

    /// Full-screen message shown instead of the preview, if any.
    pub fn message(&self) -> Option<&'static str> {
        match self.camera_permission {
            Permission::Unknown => Some(MSG_LOADING),
            Permission::Denied => Some(MSG_DENIED),
            Permission::Granted => None,
        }
    }

    /// Icon on the camera toggle: the camera a tap would switch to.
    pub fn toggle_icon(&self) -> &'static str {
        match self.camera {
            CameraFacing::Front => "camera-rear",
            CameraFacing::Back => "camera-front",
        }
    }

    /// JSON form used by the D-Bus `Status` call, with derived fields inlined.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "camera_permission": self.camera_permission,
            "state": self.state,
            "smiling_probability": self.smiling_probability,
            "readout": self.readout(),
            "camera": self.camera,
            "toggle_icon": self.toggle_icon(),
            "message": self.message(),
            "saved_photos": self.saved_photos,
            "last_notice": self.last_notice,
        })
    }
}

/// Render a probability as a percentage with one decimal.
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}
