//! User-facing notifications.

use smiley_core::Notice;

/// Interrupts the user with a notice. Synchronous and infallible.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Writes notices to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        tracing::warn!(notice = ?notice, "{notice}");
    }
}
