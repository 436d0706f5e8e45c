//! Photo capture.

use crate::error::PlatformError;
use async_trait::async_trait;
use smiley_core::{CameraFacing, CaptureOptions, ImageHandle};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Take one photo.
    ///
    /// `Ok(None)` means the camera produced nothing usable; that is not an
    /// error.
    async fn capture(&self, options: &CaptureOptions) -> Result<Option<ImageHandle>, PlatformError>;
}

/// Captures by copying the latest frame the camera service wrote for the
/// selected facing into the capture directory.
pub struct SnapshotCamera {
    front: PathBuf,
    rear: PathBuf,
    capture_dir: PathBuf,
}

impl SnapshotCamera {
    pub fn new(front: PathBuf, rear: PathBuf, capture_dir: PathBuf) -> Self {
        Self {
            front,
            rear,
            capture_dir,
        }
    }

    fn source(&self, facing: CameraFacing) -> &Path {
        match facing {
            CameraFacing::Front => &self.front,
            CameraFacing::Back => &self.rear,
        }
    }
}

#[async_trait]
impl CaptureService for SnapshotCamera {
    async fn capture(&self, options: &CaptureOptions) -> Result<Option<ImageHandle>, PlatformError> {
        let source = self.source(options.facing);

        let data = match tokio::fs::read(source).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(source = %source.display(), "no frame available");
                return Ok(None);
            }
            Err(e) => {
                return Err(PlatformError::CaptureFailed(format!(
                    "{}: {e}",
                    source.display()
                )))
            }
        };
        if data.is_empty() {
            tracing::debug!(source = %source.display(), "empty frame");
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.capture_dir).await?;
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let target = self
            .capture_dir
            .join(format!("{}.{ext}", uuid::Uuid::new_v4()));
        tokio::fs::write(&target, &data).await?;

        tracing::info!(
            facing = %options.facing,
            bytes = data.len(),
            path = %target.display(),
            "photo captured"
        );

        Ok(Some(ImageHandle {
            uri: target.to_string_lossy().into_owned(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(dir: &Path) -> SnapshotCamera {
        SnapshotCamera::new(
            dir.join("front.jpg"),
            dir.join("rear.png"),
            dir.join("captures"),
        )
    }

    #[tokio::test]
    async fn test_missing_frame_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let cam = camera(dir.path());
        let got = cam
            .capture(&CaptureOptions::max_quality(CameraFacing::Front))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_empty_frame_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("front.jpg"), b"").unwrap();
        let cam = camera(dir.path());
        let got = cam
            .capture(&CaptureOptions::max_quality(CameraFacing::Front))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_capture_copies_selected_camera() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("front.jpg"), b"front-frame").unwrap();
        std::fs::write(dir.path().join("rear.png"), b"rear-frame").unwrap();
        let cam = camera(dir.path());

        let handle = cam
            .capture(&CaptureOptions::max_quality(CameraFacing::Back))
            .await
            .unwrap()
            .unwrap();
        assert!(handle.uri.ends_with(".png"));
        assert_eq!(std::fs::read(&handle.uri).unwrap(), b"rear-frame");

        let handle = cam
            .capture(&CaptureOptions::max_quality(CameraFacing::Front))
            .await
            .unwrap()
            .unwrap();
        assert!(handle.uri.ends_with(".jpg"));
        assert_eq!(std::fs::read(&handle.uri).unwrap(), b"front-frame");
    }
}
