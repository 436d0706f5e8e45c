//! Camera and storage authorization.

use crate::error::PlatformError;
use async_trait::async_trait;
use smiley_core::Permission;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Ask for camera access. Called once at startup.
    async fn request_camera(&self) -> Result<Permission, PlatformError>;

    /// Ask for media-library write access. Called before every save.
    async fn request_storage(&self) -> Result<Permission, PlatformError>;
}

/// Filesystem-backed permissions.
///
/// Camera access is granted when the directory holding at least one
/// snapshot source can be listed. Storage access is granted when the
/// library root can be created and written.
pub struct FsPermissions {
    snapshot_sources: Vec<PathBuf>,
    library_root: PathBuf,
}

impl FsPermissions {
    pub fn new(snapshot_sources: Vec<PathBuf>, library_root: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_sources,
            library_root: library_root.into(),
        }
    }
}

#[async_trait]
impl PermissionProvider for FsPermissions {
    async fn request_camera(&self) -> Result<Permission, PlatformError> {
        for source in &self.snapshot_sources {
            let dir = source.parent().unwrap_or(Path::new("."));
            match tokio::fs::read_dir(dir).await {
                Ok(_) => {
                    tracing::debug!(source = %source.display(), "camera source reachable");
                    return Ok(Permission::Granted);
                }
                Err(e) => {
                    tracing::debug!(source = %source.display(), error = %e, "camera source unreachable");
                }
            }
        }
        Ok(Permission::Denied)
    }

    async fn request_storage(&self) -> Result<Permission, PlatformError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.library_root).await {
            return match e.kind() {
                ErrorKind::PermissionDenied => Ok(Permission::Denied),
                _ => Err(PlatformError::PermissionRequest(format!(
                    "{}: {e}",
                    self.library_root.display()
                ))),
            };
        }

        // Mode bits alone miss ownership and ACLs; try a real write.
        let check = self
            .library_root
            .join(format!(".write-check-{}", uuid::Uuid::new_v4()));
        match tokio::fs::write(&check, b"").await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&check).await {
                    tracing::debug!(path = %check.display(), error = %e, "write check left behind");
                }
                Ok(Permission::Granted)
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                tracing::debug!(root = %self.library_root.display(), "library root not writable");
                Ok(Permission::Denied)
            }
            Err(e) => Err(PlatformError::PermissionRequest(format!(
                "{}: {e}",
                self.library_root.display()
            ))),
        }
    }
}
