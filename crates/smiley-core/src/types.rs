use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single face reported by the platform face detector.
///
/// Only the smile classification is read; landmarks and bounds are
/// left to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceDescriptor {
    /// Likelihood that the face is smiling, in [0.0, 1.0].
    pub smiling_probability: f64,
}

impl FaceDescriptor {
    pub fn new(smiling_probability: f64) -> Self {
        Self { smiling_probability }
    }
}

/// Faces detected in one processed camera frame, in detector order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    #[serde(default)]
    pub faces: Vec<FaceDescriptor>,
}

#[derive(Error, Debug, PartialEq)]
pub enum EventError {
    #[error("smiling probability out of range [0, 1]: {0}")]
    ProbabilityOutOfRange(f64),
    #[error("malformed detection event: {0}")]
    Malformed(String),
}

impl DetectionEvent {
    /// An event with no faces in frame.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an event from raw smiling probabilities, rejecting anything
    /// outside [0, 1] (including NaN).
    pub fn from_probabilities<I>(probabilities: I) -> Result<Self, EventError>
    where
        I: IntoIterator<Item = f64>,
    {
        let event = Self {
            faces: probabilities.into_iter().map(FaceDescriptor::new).collect(),
        };
        event.validate()?;
        Ok(event)
    }

    /// Parse one JSON line, e.g. `{"faces":[{"smiling_probability":0.8}]}`.
    pub fn parse_line(line: &str) -> Result<Self, EventError> {
        let event: Self =
            serde_json::from_str(line).map_err(|e| EventError::Malformed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), EventError> {
        for face in &self.faces {
            let p = face.smiling_probability;
            if !(0.0..=1.0).contains(&p) {
                return Err(EventError::ProbabilityOutOfRange(p));
            }
        }
        Ok(())
    }

    /// The face the capture policy looks at. Later faces are ignored.
    pub fn primary_face(&self) -> Option<&FaceDescriptor> {
        self.faces.first()
    }
}

/// Capture controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Watching for a smile.
    #[default]
    Armed,
    /// Detection detached; a capture cycle is running or cooling down.
    Captured,
}

/// Authorization state for one platform capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Which camera the preview and captures use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    #[default]
    Front,
    Back,
}

impl CameraFacing {
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraFacing::Front => "front",
            CameraFacing::Back => "back",
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CameraFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(CameraFacing::Front),
            "back" | "rear" => Ok(CameraFacing::Back),
            other => Err(format!("unknown camera facing: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Max,
}

/// Parameters handed to the capture service for one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub quality: Quality,
    /// Return the sensor image as-is, without platform post-processing.
    pub skip_processing: bool,
    pub facing: CameraFacing,
}

impl CaptureOptions {
    /// Maximum quality, no post-processing.
    pub fn max_quality(facing: CameraFacing) -> Self {
        Self {
            quality: Quality::Max,
            skip_processing: true,
            facing,
        }
    }
}

/// Reference to a freshly captured image, owned by the capture service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub uri: String,
}

/// An image persisted in the media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub uri: String,
    pub created_at: String,
}

/// A named album in the media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumHandle {
    pub id: String,
    pub name: String,
}

/// User-facing notification raised by a failed capture or save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Notice {
    CaptureFailed(String),
    StorageUnavailable,
    SaveFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::CaptureFailed(e) => write!(f, "Could not take photo: {e}"),
            Notice::StorageUnavailable => {
                f.write_str("No permission to save photos; this photo was not saved")
            }
            Notice::SaveFailed(e) => write!(f, "Could not save photo: {e}"),
        }
    }
}
