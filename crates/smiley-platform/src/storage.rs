//! Media library: assets and named albums.

use crate::error::PlatformError;
use async_trait::async_trait;
use smiley_core::{AlbumHandle, Asset, ImageHandle};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Import a captured image into the library, taking ownership of it.
    async fn create_asset(&self, image: &ImageHandle) -> Result<Asset, PlatformError>;

    /// Look up an album by name.
    async fn find_album(&self, name: &str) -> Result<Option<AlbumHandle>, PlatformError>;

    /// Create an album seeded with `asset`.
    async fn create_album(&self, name: &str, asset: &Asset) -> Result<AlbumHandle, PlatformError>;

    /// Add `asset` to an existing album.
    async fn append_asset(&self, asset: &Asset, album: &AlbumHandle) -> Result<(), PlatformError>;
}

/// Directory-backed media library.
///
/// Layout:
/// ```text
/// <root>/assets/<id>.<ext>
/// <root>/albums/<name>/<id>.<ext>   hard link to the asset
/// ```
///
/// Importing moves the captured image, so each photo is stored once.
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    fn album_dir(&self, name: &str) -> Result<PathBuf, PlatformError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(PlatformError::InvalidAlbumName(name.to_string()));
        }
        Ok(self.root.join("albums").join(name))
    }

    async fn file_into(&self, asset: &Asset, album_dir: &Path) -> Result<(), PlatformError> {
        let file_name = Path::new(&asset.uri)
            .file_name()
            .ok_or_else(|| PlatformError::AssetFailed(format!("bad asset uri: {}", asset.uri)))?;
        let entry = album_dir.join(file_name);
        if let Err(e) = tokio::fs::hard_link(&asset.uri, &entry).await {
            tracing::debug!(error = %e, "hard link failed; copying asset into album");
            tokio::fs::copy(&asset.uri, &entry).await?;
        }
        Ok(())
    }
}

/// Move `from` to `to`, copying across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(e),
        Err(e) => {
            tracing::debug!(error = %e, "rename failed; falling back to copy");
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

#[async_trait]
impl StorageService for DirectoryLibrary {
    async fn create_asset(&self, image: &ImageHandle) -> Result<Asset, PlatformError> {
        let source = Path::new(&image.uri);
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.assets_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let target = dir.join(format!("{id}.{ext}"));
        move_file(source, &target)
            .await
            .map_err(|e| PlatformError::AssetFailed(format!("{}: {e}", image.uri)))?;

        tracing::debug!(id = %id, path = %target.display(), "asset created");
        Ok(Asset {
            id,
            uri: target.to_string_lossy().into_owned(),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn find_album(&self, name: &str) -> Result<Option<AlbumHandle>, PlatformError> {
        let dir = self.album_dir(name)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Some(AlbumHandle {
                id: name.to_string(),
                name: name.to_string(),
            })),
            Ok(_) => Err(PlatformError::AlbumFailed {
                name: name.to_string(),
                reason: "exists but is not a directory".into(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_album(&self, name: &str, asset: &Asset) -> Result<AlbumHandle, PlatformError> {
        let dir = self.album_dir(name)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PlatformError::AlbumFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        self.file_into(asset, &dir).await?;
        tracing::info!(album = name, "album created");
        Ok(AlbumHandle {
            id: name.to_string(),
            name: name.to_string(),
        })
    }

    async fn append_asset(&self, asset: &Asset, album: &AlbumHandle) -> Result<(), PlatformError> {
        let dir = self.album_dir(&album.id)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(PlatformError::AlbumFailed {
                name: album.name.clone(),
                reason: "album no longer exists".into(),
            });
        }
        self.file_into(asset, &dir).await
    }
}
