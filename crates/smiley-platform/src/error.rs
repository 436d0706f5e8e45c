use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("permission request failed: {0}")]
    PermissionRequest(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("asset creation failed: {0}")]
    AssetFailed(String),
    #[error("album {name:?}: {reason}")]
    AlbumFailed { name: String, reason: String },
    #[error("invalid album name: {0:?}")]
    InvalidAlbumName(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
