//! smiley-platform — Platform capabilities consumed by the capture engine.
//!
//! Each capability is a trait: camera/storage permissions, photo capture,
//! and the media library. Directory-backed implementations serve the
//! daemon; in-memory ones in [`memory`] script behaviour for tests.
//! [`SignalHub`] is the face-detection ingress.

pub mod capture;
pub mod error;
pub mod memory;
pub mod notify;
pub mod permission;
pub mod signal;
pub mod storage;

pub use capture::{CaptureService, SnapshotCamera};
pub use error::PlatformError;
pub use notify::{LogNotifier, Notifier};
pub use permission::{FsPermissions, PermissionProvider};
pub use signal::{Delivery, SignalHub, Subscription};
pub use storage::{DirectoryLibrary, StorageService};
