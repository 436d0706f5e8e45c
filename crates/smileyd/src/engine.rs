use smiley_core::{
    AlbumHandle, CameraFacing, CaptureOptions, CaptureStateMachine, CycleOutcome,
    DetectionEvent, ImageHandle, Notice, Permission, Rearm, Snapshot, Transition, ALBUM_NAME,
};
use smiley_platform::{
    CaptureService, Delivery, Notifier, PermissionProvider, PlatformError, SignalHub,
    StorageService, Subscription,
};
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine task exited")]
    ChannelClosed,
}

/// Why a save did not complete.
#[derive(Error, Debug)]
enum SaveError {
    #[error("storage permission not granted")]
    StorageDenied,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Platform capabilities the engine drives.
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionProvider>,
    pub camera: Arc<dyn CaptureService>,
    pub storage: Arc<dyn StorageService>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// File a captured image into the album, creating the album on first use.
    ///
    /// Storage permission is asked for on every call.
    async fn save(&self, image: &ImageHandle) -> Result<AlbumHandle, SaveError> {
        let permission = self.permissions.request_storage().await?;
        if permission != Permission::Granted {
            tracing::warn!(?permission, "storage permission not granted");
            return Err(SaveError::StorageDenied);
        }

        let asset = self.storage.create_asset(image).await?;
        let album = match self.storage.find_album(ALBUM_NAME).await? {
            Some(album) => {
                self.storage.append_asset(&asset, &album).await?;
                album
            }
            None => self.storage.create_album(ALBUM_NAME, &asset).await?,
        };
        tracing::debug!(asset = %asset.id, album = %album.id, "asset filed");
        Ok(album)
    }
}

/// A capture cycle in flight: its outcome and the notice to raise, if any.
type Cycle = Pin<Box<dyn Future<Output = (CycleOutcome, Option<Notice>)> + Send>>;

/// Messages sent from the D-Bus interface to the engine task.
enum EngineRequest {
    ToggleCamera {
        reply: oneshot::Sender<CameraFacing>,
    },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    view: watch::Receiver<Snapshot>,
    signals: Arc<SignalHub>,
}

impl EngineHandle {
    /// Current presentation state.
    pub fn snapshot(&self) -> Snapshot {
        self.view.borrow().clone()
    }

    /// Feed one face-detection result into the engine.
    pub fn publish(&self, event: DetectionEvent) -> Delivery {
        self.signals.publish(event)
    }

    /// Switch between front and back camera. Returns the new selection.
    pub async fn toggle_camera(&self) -> Result<CameraFacing, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ToggleCamera { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on the current tokio runtime.
///
/// The engine asks for camera permission first. Detection stays detached
/// for the lifetime of the engine unless it is granted.
pub fn spawn_engine(
    collaborators: Collaborators,
    initial_camera: CameraFacing,
    detection_interval: Duration,
) -> EngineHandle {
    let signals = Arc::new(SignalHub::new(detection_interval));
    let (tx, rx) = mpsc::channel::<EngineRequest>(4);
    let (view_tx, view_rx) = watch::channel(Snapshot {
        camera: initial_camera,
        ..Snapshot::default()
    });

    let engine = Engine {
        collab: Arc::new(collaborators),
        machine: CaptureStateMachine::new(),
        camera: initial_camera,
        signals: signals.clone(),
        subscription: None,
        cycle: None,
        cooldown: None,
        view: view_tx,
    };
    tokio::spawn(engine.run(rx));

    EngineHandle {
        tx,
        view: view_rx,
        signals,
    }
}

struct Engine {
    collab: Arc<Collaborators>,
    machine: CaptureStateMachine,
    camera: CameraFacing,
    signals: Arc<SignalHub>,
    /// `Some` exactly while armed with camera permission.
    subscription: Option<Subscription>,
    /// Capture and save, polled next to control requests.
    cycle: Option<Cycle>,
    /// Pending re-arm after a cycle that reached the library.
    cooldown: Option<Pin<Box<Sleep>>>,
    view: watch::Sender<Snapshot>,
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        tracing::info!("engine task started");
        self.open_gate().await;

        loop {
            tokio::select! {
                req = rx.recv() => match req {
                    Some(req) => self.handle_request(req),
                    None => break,
                },
                Some(event) = next_event(&mut self.subscription) => {
                    self.on_detection(event);
                }
                (outcome, notice) = cycle_finished(&mut self.cycle) => {
                    if let Some(notice) = notice {
                        self.raise(notice);
                    }
                    if outcome == CycleOutcome::Saved {
                        self.view.send_modify(|s| s.saved_photos += 1);
                    }
                    self.finish_cycle(outcome);
                }
                () = cooldown_elapsed(&mut self.cooldown) => {
                    tracing::debug!("cooldown elapsed");
                    self.rearm();
                }
            }
        }
        tracing::info!("engine task exiting");
    }

    /// Ask for camera access once; only a grant attaches detection.
    async fn open_gate(&mut self) {
        let permission = match self.collab.permissions.request_camera().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "camera permission request failed");
                Permission::Denied
            }
        };

        if permission == Permission::Granted {
            self.subscription = Some(self.signals.attach());
            tracing::info!(camera = %self.camera, "camera permission granted; armed");
        } else {
            tracing::warn!(?permission, "camera permission not granted; detection disabled");
        }
        self.view.send_modify(|s| s.camera_permission = permission);
    }

    fn handle_request(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::ToggleCamera { reply } => {
                self.camera = self.camera.toggled();
                let camera = self.camera;
                self.view.send_modify(|s| s.camera = camera);
                tracing::info!(%camera, "camera switched");
                let _ = reply.send(camera);
            }
        }
    }

    fn on_detection(&mut self, event: DetectionEvent) {
        match self.machine.on_detection(&event) {
            Transition::Ignored => {}
            Transition::Observed { probability } => {
                tracing::trace!(probability, "face observed");
                self.publish_view();
            }
            Transition::Triggered { probability } => {
                // Detach first: frames produced during the cycle are dropped
                // at the hub.
                self.subscription = None;
                tracing::info!(probability, camera = %self.camera, "smile detected; capturing");
                self.publish_view();

                let options = CaptureOptions::max_quality(self.camera);
                self.cycle = Some(Box::pin(capture_cycle(self.collab.clone(), options)));
            }
        }
    }

    fn finish_cycle(&mut self, outcome: CycleOutcome) {
        match outcome.rearm() {
            Rearm::Immediately => self.rearm(),
            Rearm::After(delay) => {
                tracing::debug!(?outcome, ?delay, "cooling down");
                self.cooldown = Some(Box::pin(tokio::time::sleep(delay)));
            }
        }
    }

    fn rearm(&mut self) {
        self.machine.rearm();
        self.subscription = Some(self.signals.attach());
        self.publish_view();
        tracing::info!("armed");
    }

    fn raise(&self, notice: Notice) {
        self.collab.notifier.notify(&notice);
        let text = notice.to_string();
        self.view.send_modify(|s| s.last_notice = Some(text));
    }

    fn publish_view(&self) {
        let state = self.machine.state();
        let probability = self.machine.displayed_probability();
        self.view.send_modify(|s| {
            s.state = state;
            s.smiling_probability = probability;
        });
    }
}

/// Take one photo and file it. Never touches engine state.
async fn capture_cycle(
    collab: Arc<Collaborators>,
    options: CaptureOptions,
) -> (CycleOutcome, Option<Notice>) {
    let image = match collab.camera.capture(&options).await {
        Ok(Some(image)) => image,
        Ok(None) => {
            tracing::debug!("capture returned no image");
            return (CycleOutcome::Empty, None);
        }
        Err(e) => {
            return (
                CycleOutcome::CaptureFailed,
                Some(Notice::CaptureFailed(e.to_string())),
            )
        }
    };

    match collab.save(&image).await {
        Ok(album) => {
            tracing::info!(album = %album.name, uri = %image.uri, "photo saved");
            (CycleOutcome::Saved, None)
        }
        Err(SaveError::StorageDenied) => {
            (CycleOutcome::StorageDenied, Some(Notice::StorageUnavailable))
        }
        Err(SaveError::Platform(e)) => (
            CycleOutcome::SaveFailed,
            Some(Notice::SaveFailed(e.to_string())),
        ),
    }
}

async fn cycle_finished(cycle: &mut Option<Cycle>) -> (CycleOutcome, Option<Notice>) {
    match cycle {
        Some(fut) => {
            let result = fut.as_mut().await;
            *cycle = None;
            result
        }
        None => pending().await,
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<DetectionEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => pending().await,
    }
}

async fn cooldown_elapsed(cooldown: &mut Option<Pin<Box<Sleep>>>) {
    match cooldown {
        Some(sleep) => {
            sleep.as_mut().await;
            *cooldown = None;
        }
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smiley_core::{CaptureState, Quality, REARM_COOLDOWN};
    use smiley_platform::memory::{
        LibraryOp, MemoryLibrary, MemoryNotifier, MemoryPermissions, ScriptedCamera, Shot,
    };
    use tokio::sync::Notify;

    struct Rig {
        handle: EngineHandle,
        permissions: Arc<MemoryPermissions>,
        camera: Arc<ScriptedCamera>,
        library: Arc<MemoryLibrary>,
        notifier: Arc<MemoryNotifier>,
    }

    fn rig(permissions: MemoryPermissions) -> Rig {
        let permissions = Arc::new(permissions);
        let camera = Arc::new(ScriptedCamera::new());
        let library = Arc::new(MemoryLibrary::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let handle = spawn_engine(
            Collaborators {
                permissions: permissions.clone(),
                camera: camera.clone(),
                storage: library.clone(),
                notifier: notifier.clone(),
            },
            CameraFacing::Front,
            Duration::ZERO,
        );
        Rig {
            handle,
            permissions,
            camera,
            library,
            notifier,
        }
    }

    async fn armed_rig() -> Rig {
        let rig = rig(MemoryPermissions::granted());
        wait(&rig.handle, |s| s.camera_permission == Permission::Granted).await;
        rig
    }

    async fn wait(handle: &EngineHandle, pred: impl FnMut(&Snapshot) -> bool) -> Snapshot {
        let mut view = handle.view.clone();
        let snapshot = tokio::time::timeout(Duration::from_secs(60), view.wait_for(pred))
            .await
            .expect("timed out waiting for engine")
            .expect("engine exited");
        (*snapshot).clone()
    }

    fn smile(p: f64) -> DetectionEvent {
        DetectionEvent::from_probabilities([p]).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_denied_never_attaches() {
        let rig = rig(MemoryPermissions::new(Permission::Denied, Permission::Granted));
        let snap = wait(&rig.handle, |s| s.camera_permission != Permission::Unknown).await;

        assert_eq!(snap.camera_permission, Permission::Denied);
        assert_eq!(snap.message(), Some("Don't have permission for this"));
        assert!(!rig.handle.signals.is_attached());
        assert_eq!(rig.handle.publish(smile(0.95)), Delivery::Detached);
        assert!(rig.camera.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_until_permission_answered() {
        let rig = rig(MemoryPermissions::granted());
        // Engine has not run yet on the current-thread runtime
        assert_eq!(rig.handle.snapshot().message(), Some("Loading"));
        let snap = wait(&rig.handle, |s| s.camera_permission == Permission::Granted).await;
        assert_eq!(snap.message(), None);
        assert!(rig.handle.signals.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_smile_above_threshold_captures() {
        let rig = armed_rig().await;

        for (p, shown) in [(0.1, "10.0%"), (0.5, "50.0%"), (0.72, "72.0%")] {
            assert_eq!(rig.handle.publish(smile(p)), Delivery::Delivered);
            let snap = wait(&rig.handle, |s| s.readout() == shown).await;
            assert_eq!(snap.readout(), shown);
        }

        let snap = wait(&rig.handle, |s| s.saved_photos == 1).await;
        assert_eq!(snap.state, CaptureState::Captured);
        assert_eq!(snap.readout(), "72.0%");

        let requests = rig.camera.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].quality, Quality::Max);
        assert!(requests[0].skip_processing);
        assert!(rig.notifier.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_first_face_counts() {
        let rig = armed_rig().await;
        rig.handle
            .publish(DetectionEvent::from_probabilities([0.2, 0.95]).unwrap());
        let snap = wait(&rig.handle, |s| s.readout() == "20.0%").await;
        assert_eq!(snap.state, CaptureState::Armed);
        assert!(rig.camera.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_during_capture_are_dropped() {
        let rig = armed_rig().await;
        // Both buffered before the engine runs; the first one detaches.
        assert_eq!(rig.handle.publish(smile(0.9)), Delivery::Delivered);
        assert_eq!(rig.handle.publish(smile(0.95)), Delivery::Delivered);

        let snap = wait(&rig.handle, |s| s.saved_photos == 1).await;
        assert_eq!(snap.readout(), "90.0%");
        assert_eq!(rig.camera.requests().len(), 1);
        assert_eq!(rig.handle.publish(smile(0.99)), Delivery::Detached);
        assert_eq!(rig.handle.snapshot().readout(), "90.0%");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_then_second_capture_appends() {
        let rig = armed_rig().await;

        rig.handle.publish(smile(0.8));
        wait(&rig.handle, |s| s.saved_photos == 1).await;
        assert_eq!(rig.library.album(ALBUM_NAME).unwrap().len(), 1);

        tokio::time::advance(REARM_COOLDOWN - Duration::from_millis(1)).await;
        assert_eq!(rig.handle.snapshot().state, CaptureState::Captured);
        assert_eq!(rig.handle.publish(smile(0.9)), Delivery::Detached);

        tokio::time::advance(Duration::from_millis(1)).await;
        wait(&rig.handle, |s| s.state == CaptureState::Armed).await;

        assert_eq!(rig.handle.publish(smile(0.9)), Delivery::Delivered);
        wait(&rig.handle, |s| s.saved_photos == 2).await;

        assert_eq!(rig.camera.requests().len(), 2);
        assert_eq!(rig.library.album_count(), 1);
        assert_eq!(rig.library.album_creations(), 1);
        assert_eq!(rig.library.album(ALBUM_NAME).unwrap().len(), 2);
        assert_eq!(rig.permissions.storage_requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_capture_rearms_silently() {
        let rig = armed_rig().await;
        rig.camera.push(Shot::Empty);

        rig.handle.publish(smile(0.9));
        let camera = rig.camera.clone();
        wait(&rig.handle, move |s| {
            s.state == CaptureState::Armed && camera.requests().len() == 1
        })
        .await;

        assert!(rig.notifier.notices().is_empty());
        assert_eq!(rig.library.asset_count(), 0);
        assert_eq!(rig.permissions.storage_requests(), 0);

        // No cooldown on this path
        assert_eq!(rig.handle.publish(smile(0.9)), Delivery::Delivered);
        wait(&rig.handle, |s| s.saved_photos == 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_notifies_and_rearms() {
        let rig = armed_rig().await;
        rig.camera.push(Shot::Fail("camera busy".into()));

        rig.handle.publish(smile(0.9));
        let snap = wait(&rig.handle, |s| s.last_notice.is_some()).await;
        assert_eq!(
            rig.notifier.notices(),
            vec![Notice::CaptureFailed("capture failed: camera busy".into())]
        );
        assert_eq!(
            snap.last_notice.as_deref(),
            Some("Could not take photo: capture failed: camera busy")
        );

        wait(&rig.handle, |s| s.state == CaptureState::Armed).await;
        assert_eq!(rig.handle.publish(smile(0.9)), Delivery::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_denied_notifies_and_rearms_after_cooldown() {
        let rig = rig(MemoryPermissions::new(Permission::Granted, Permission::Denied));
        wait(&rig.handle, |s| s.camera_permission == Permission::Granted).await;

        rig.handle.publish(smile(0.9));
        let snap = wait(&rig.handle, |s| s.last_notice.is_some()).await;
        assert_eq!(rig.notifier.notices(), vec![Notice::StorageUnavailable]);
        assert_eq!(snap.state, CaptureState::Captured);
        assert_eq!(snap.saved_photos, 0);
        assert_eq!(rig.library.asset_count(), 0);

        tokio::time::advance(REARM_COOLDOWN).await;
        wait(&rig.handle, |s| s.state == CaptureState::Armed).await;

        // Asked again on the next save, not cached
        rig.permissions.set_storage(Permission::Granted);
        rig.handle.publish(smile(0.9));
        wait(&rig.handle, |s| s.saved_photos == 1).await;
        assert_eq!(rig.permissions.storage_requests(), 2);
        assert_eq!(rig.library.album(ALBUM_NAME).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_notifies_and_rearms_after_cooldown() {
        let rig = armed_rig().await;
        rig.library.fail_next(LibraryOp::CreateAlbum);

        rig.handle.publish(smile(0.9));
        wait(&rig.handle, |s| s.last_notice.is_some()).await;
        let notices = rig.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], Notice::SaveFailed(_)));
        assert!(rig.library.album(ALBUM_NAME).is_none());

        tokio::time::advance(REARM_COOLDOWN).await;
        wait(&rig.handle, |s| s.state == CaptureState::Armed).await;

        rig.handle.publish(smile(0.9));
        wait(&rig.handle, |s| s.saved_photos == 1).await;
        assert_eq!(rig.library.album(ALBUM_NAME).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hair_above_threshold_captures() {
        let rig = armed_rig().await;
        assert_eq!(rig.handle.publish(smile(0.700_000_015)), Delivery::Delivered);
        let snap = wait(&rig.handle, |s| s.saved_photos == 1).await;
        assert_eq!(snap.readout(), "70.0%");
        assert_eq!(rig.camera.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_save_step_failure_notifies_and_cools_down() {
        #[derive(Debug, Clone, Copy)]
        enum Fault {
            StorageRequest,
            Library(LibraryOp),
        }

        for fault in [
            Fault::StorageRequest,
            Fault::Library(LibraryOp::CreateAsset),
            Fault::Library(LibraryOp::FindAlbum),
            Fault::Library(LibraryOp::CreateAlbum),
            Fault::Library(LibraryOp::AppendAsset),
        ] {
            let rig = armed_rig().await;

            // Appending only happens once the album exists
            let saved_before = if matches!(fault, Fault::Library(LibraryOp::AppendAsset)) {
                rig.handle.publish(smile(0.9));
                wait(&rig.handle, |s| s.saved_photos == 1).await;
                tokio::time::advance(REARM_COOLDOWN).await;
                wait(&rig.handle, |s| s.state == CaptureState::Armed).await;
                1
            } else {
                0
            };

            match fault {
                Fault::StorageRequest => rig.permissions.fail_next_storage("portal crashed"),
                Fault::Library(op) => rig.library.fail_next(op),
            }

            rig.handle.publish(smile(0.9));
            let snap = wait(&rig.handle, |s| s.last_notice.is_some()).await;
            let notices = rig.notifier.notices();
            assert_eq!(notices.len(), 1, "{fault:?}");
            assert!(matches!(notices[0], Notice::SaveFailed(_)), "{fault:?}");
            assert_eq!(snap.state, CaptureState::Captured, "{fault:?}");
            assert_eq!(snap.saved_photos, saved_before, "{fault:?}");
            assert_eq!(
                rig.library.album(ALBUM_NAME).map_or(0, |ids| ids.len()),
                saved_before as usize,
                "{fault:?}"
            );

            tokio::time::advance(REARM_COOLDOWN - Duration::from_millis(1)).await;
            assert_eq!(rig.handle.snapshot().state, CaptureState::Captured, "{fault:?}");
            tokio::time::advance(Duration::from_millis(1)).await;
            wait(&rig.handle, |s| s.state == CaptureState::Armed).await;
            assert_eq!(rig.handle.publish(smile(0.1)), Delivery::Delivered, "{fault:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_answers_while_capture_in_flight() {
        let rig = armed_rig().await;
        let release = Arc::new(Notify::new());
        rig.camera.push(Shot::Held(release.clone()));

        rig.handle.publish(smile(0.9));
        wait(&rig.handle, |s| s.state == CaptureState::Captured).await;

        let camera = tokio::time::timeout(Duration::from_secs(1), rig.handle.toggle_camera())
            .await
            .expect("toggle blocked by capture")
            .unwrap();
        assert_eq!(camera, CameraFacing::Back);
        assert_eq!(rig.handle.snapshot().saved_photos, 0);

        release.notify_one();
        wait(&rig.handle, |s| s.saved_photos == 1).await;
        // The photo comes from the camera selected when the smile fired
        assert_eq!(rig.camera.requests()[0].facing, CameraFacing::Front);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_camera_selects_capture_source() {
        let rig = armed_rig().await;

        assert_eq!(rig.handle.toggle_camera().await.unwrap(), CameraFacing::Back);
        let snap = rig.handle.snapshot();
        assert_eq!(snap.camera, CameraFacing::Back);
        assert_eq!(snap.toggle_icon(), "camera-front");

        rig.handle.publish(smile(0.9));
        wait(&rig.handle, |s| s.saved_photos == 1).await;
        assert_eq!(rig.camera.requests()[0].facing, CameraFacing::Back);

        assert_eq!(rig.handle.toggle_camera().await.unwrap(), CameraFacing::Front);
    }
}
