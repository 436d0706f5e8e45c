use crate::engine::EngineHandle;
use smiley_core::DetectionEvent;
use zbus::interface;

/// D-Bus interface for the Smiley Cam daemon.
///
/// Bus name: org.smileycam.SmileyCam1
/// Object path: /org/smileycam/SmileyCam1
pub struct SmileyService {
    engine: EngineHandle,
}

impl SmileyService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.smileycam.SmileyCam1")]
impl SmileyService {
    /// Return the presentation snapshot as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let mut status = self.engine.snapshot().to_json();
        status["version"] = env!("CARGO_PKG_VERSION").into();
        Ok(status.to_string())
    }

    /// Switch between front and back camera; returns the new selection.
    async fn toggle_camera(&self) -> zbus::fdo::Result<String> {
        let camera = self
            .engine
            .toggle_camera()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(camera.to_string())
    }

    /// Deliver one face-detection result: the smiling probability of each
    /// face in the frame, in detector order. An empty list means no face.
    ///
    /// Returns `delivered`, `detached`, `dropped` or `throttled`.
    async fn push_detection(&self, smiling_probabilities: Vec<f64>) -> zbus::fdo::Result<String> {
        let event = DetectionEvent::from_probabilities(smiling_probabilities)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        let delivery = self.engine.publish(event);
        tracing::trace!(delivery = delivery.as_str(), "detection pushed");
        Ok(delivery.as_str().to_string())
    }
}
