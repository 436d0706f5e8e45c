//! In-memory collaborators with scripted behaviour.
//!
//! Used by the engine tests and handy for dry runs: every call is recorded
//! and failures can be queued per operation.

use crate::capture::CaptureService;
use crate::error::PlatformError;
use crate::notify::Notifier;
use crate::permission::PermissionProvider;
use crate::storage::StorageService;
use async_trait::async_trait;
use smiley_core::{AlbumHandle, Asset, CaptureOptions, ImageHandle, Notice, Permission};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed camera answer, storage answer changeable between captures.
pub struct MemoryPermissions {
    camera: Permission,
    storage: Mutex<Permission>,
    storage_failure: Mutex<Option<String>>,
    storage_requests: AtomicUsize,
}

impl MemoryPermissions {
    pub fn new(camera: Permission, storage: Permission) -> Self {
        Self {
            camera,
            storage: Mutex::new(storage),
            storage_failure: Mutex::new(None),
            storage_requests: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(Permission::Granted, Permission::Granted)
    }

    pub fn set_storage(&self, permission: Permission) {
        *lock(&self.storage) = permission;
    }

    /// Make the next storage request fail instead of answering.
    pub fn fail_next_storage(&self, reason: impl Into<String>) {
        *lock(&self.storage_failure) = Some(reason.into());
    }

    pub fn storage_requests(&self) -> usize {
        self.storage_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for MemoryPermissions {
    async fn request_camera(&self) -> Result<Permission, PlatformError> {
        Ok(self.camera)
    }

    async fn request_storage(&self) -> Result<Permission, PlatformError> {
        self.storage_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.storage_failure).take() {
            return Err(PlatformError::PermissionRequest(reason));
        }
        Ok(*lock(&self.storage))
    }
}

/// One scripted capture result.
#[derive(Debug, Clone)]
pub enum Shot {
    Image,
    Empty,
    Fail(String),
    /// An image, once the [`Notify`] is signalled.
    Held(Arc<Notify>),
}

/// Camera that replays queued [`Shot`]s, then returns images.
#[derive(Default)]
pub struct ScriptedCamera {
    script: Mutex<VecDeque<Shot>>,
    requests: Mutex<Vec<CaptureOptions>>,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, shot: Shot) {
        lock(&self.script).push_back(shot);
    }

    /// Options of every capture request, in order.
    pub fn requests(&self) -> Vec<CaptureOptions> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl CaptureService for ScriptedCamera {
    async fn capture(&self, options: &CaptureOptions) -> Result<Option<ImageHandle>, PlatformError> {
        let n = {
            let mut requests = lock(&self.requests);
            requests.push(options.clone());
            requests.len()
        };
        let shot = lock(&self.script).pop_front().unwrap_or(Shot::Image);
        let image = ImageHandle {
            uri: format!("memory://capture/{n}"),
        };
        match shot {
            Shot::Image => Ok(Some(image)),
            Shot::Held(release) => {
                release.notified().await;
                Ok(Some(image))
            }
            Shot::Empty => Ok(None),
            Shot::Fail(reason) => Err(PlatformError::CaptureFailed(reason)),
        }
    }
}

/// Library operation a failure can be queued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryOp {
    CreateAsset,
    FindAlbum,
    CreateAlbum,
    AppendAsset,
}

#[derive(Default)]
struct LibraryState {
    assets: Vec<Asset>,
    /// (handle, asset ids)
    albums: Vec<(AlbumHandle, Vec<String>)>,
    failures: VecDeque<LibraryOp>,
    album_creations: usize,
}

/// Media library held in memory.
#[derive(Default)]
pub struct MemoryLibrary {
    state: Mutex<LibraryState>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail once.
    pub fn fail_next(&self, op: LibraryOp) {
        lock(&self.state).failures.push_back(op);
    }

    /// Asset ids filed in `name`, or `None` if no such album.
    pub fn album(&self, name: &str) -> Option<Vec<String>> {
        lock(&self.state)
            .albums
            .iter()
            .find(|(h, _)| h.name == name)
            .map(|(_, ids)| ids.clone())
    }

    pub fn album_count(&self) -> usize {
        lock(&self.state).albums.len()
    }

    pub fn album_creations(&self) -> usize {
        lock(&self.state).album_creations
    }

    pub fn asset_count(&self) -> usize {
        lock(&self.state).assets.len()
    }

    fn check(&self, state: &mut LibraryState, op: LibraryOp) -> Result<(), PlatformError> {
        if state.failures.front() == Some(&op) {
            state.failures.pop_front();
            return Err(match op {
                LibraryOp::CreateAsset => PlatformError::AssetFailed("injected".into()),
                _ => PlatformError::AlbumFailed {
                    name: format!("{op:?}"),
                    reason: "injected".into(),
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MemoryLibrary {
    async fn create_asset(&self, image: &ImageHandle) -> Result<Asset, PlatformError> {
        let mut state = lock(&self.state);
        self.check(&mut state, LibraryOp::CreateAsset)?;
        let asset = Asset {
            id: format!("asset-{}", state.assets.len() + 1),
            uri: image.uri.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        state.assets.push(asset.clone());
        Ok(asset)
    }

    async fn find_album(&self, name: &str) -> Result<Option<AlbumHandle>, PlatformError> {
        let mut state = lock(&self.state);
        self.check(&mut state, LibraryOp::FindAlbum)?;
        Ok(state
            .albums
            .iter()
            .find(|(h, _)| h.name == name)
            .map(|(h, _)| h.clone()))
    }

    async fn create_album(&self, name: &str, asset: &Asset) -> Result<AlbumHandle, PlatformError> {
        let mut state = lock(&self.state);
        self.check(&mut state, LibraryOp::CreateAlbum)?;
        let handle = AlbumHandle {
            id: format!("album-{}", state.albums.len() + 1),
            name: name.to_string(),
        };
        state.albums.push((handle.clone(), vec![asset.id.clone()]));
        state.album_creations += 1;
        Ok(handle)
    }

    async fn append_asset(&self, asset: &Asset, album: &AlbumHandle) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        self.check(&mut state, LibraryOp::AppendAsset)?;
        let (_, ids) = state
            .albums
            .iter_mut()
            .find(|(h, _)| h.id == album.id)
            .ok_or_else(|| PlatformError::AlbumFailed {
                name: album.name.clone(),
                reason: "unknown album".into(),
            })?;
        ids.push(asset.id.clone());
        Ok(())
    }
}

/// Records every notice.
#[derive(Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: &Notice) {
        lock(&self.notices).push(notice.clone());
    }
}
