//! Face signal hub — the push side of face detection.
//!
//! The detector publishes one [`DetectionEvent`] per processed frame. At
//! most one subscriber is attached; while none is, events are dropped at
//! the hub. The engine detaches by dropping its [`Subscription`].

use smiley_core::DetectionEvent;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Frames buffered between the detector and a busy subscriber.
const SUBSCRIPTION_BUFFER: usize = 8;

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No subscriber attached.
    Detached,
    /// Subscriber attached but still busy with earlier frames.
    Dropped,
    /// Arrived within the minimum detection interval of the previous event.
    Throttled,
}

impl Delivery {
    pub fn as_str(self) -> &'static str {
        match self {
            Delivery::Delivered => "delivered",
            Delivery::Detached => "detached",
            Delivery::Dropped => "dropped",
            Delivery::Throttled => "throttled",
        }
    }
}

struct HubInner {
    tx: Option<mpsc::Sender<DetectionEvent>>,
    last_delivered: Option<Instant>,
}

pub struct SignalHub {
    inner: Mutex<HubInner>,
    min_interval: Duration,
}

/// Receiving end of an attached subscription. Dropping it detaches.
pub struct Subscription {
    rx: mpsc::Receiver<DetectionEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<DetectionEvent> {
        self.rx.recv().await
    }
}

impl SignalHub {
    /// Create a hub delivering at most one event per `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                tx: None,
                last_delivered: None,
            }),
            min_interval,
        }
    }

    /// Attach a new subscriber, replacing any previous one.
    pub fn attach(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut inner = self.lock();
        inner.tx = Some(tx);
        inner.last_delivered = None;
        tracing::debug!("face signal subscriber attached");
        Subscription { rx }
    }

    /// Whether a live subscriber is attached.
    pub fn is_attached(&self) -> bool {
        self.lock().tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Push one detection result towards the subscriber.
    pub fn publish(&self, event: DetectionEvent) -> Delivery {
        let mut inner = self.lock();

        let Some(tx) = inner.tx.as_ref() else {
            return Delivery::Detached;
        };
        if tx.is_closed() {
            inner.tx = None;
            tracing::debug!("face signal subscriber detached");
            return Delivery::Detached;
        }

        let now = Instant::now();
        if let Some(last) = inner.last_delivered {
            if now.duration_since(last) < self.min_interval {
                return Delivery::Throttled;
            }
        }

        match tx.try_send(event) {
            Ok(()) => {
                inner.last_delivered = Some(now);
                Delivery::Delivered
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("subscriber busy; dropping detection event");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                inner.tx = None;
                Delivery::Detached
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
