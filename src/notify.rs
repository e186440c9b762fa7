//! Local transition notifications.
//!
//! In-process observers register for `"GeofenceEntered"` and/or
//! `"GeofenceExited"` and receive [`TransitionEvent`]s on a bounded stream.
//! Publishing never blocks: a full or abandoned stream drops the event and
//! bumps a counter. The owning controller removes every subscriber on stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geofence::{Geofence, TransitionKind};

/// A confirmed geofence transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Unique id of this firing.
    pub event_id: Uuid,
    /// Entered or exited.
    pub kind: TransitionKind,
    /// The geofence record, as pushed by the backend.
    pub geofence: Geofence,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    /// A new event with a fresh id.
    #[must_use]
    pub fn new(kind: TransitionKind, geofence: Geofence, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            geofence,
            timestamp,
        }
    }

    /// Notification name (`"GeofenceEntered"` / `"GeofenceExited"`).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.notification_name()
    }
}

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct SubscriberEntry {
    kinds: Vec<TransitionKind>,
    tx: Sender<TransitionEvent>,
}

type Registry = Mutex<HashMap<SubscriptionId, SubscriberEntry>>;

/// Observer registry owned by the component that emits transitions.
#[derive(Debug)]
pub struct Notifier {
    stream_capacity: usize,
    subscribers: Arc<Registry>,
    dropped_events: AtomicU64,
}

impl Notifier {
    /// Creates a notifier whose subscriber streams buffer `stream_capacity` events.
    #[must_use]
    pub fn new(stream_capacity: usize) -> Self {
        Self {
            stream_capacity: stream_capacity.max(1),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Registers for the given transition kinds. An empty slice means both.
    #[must_use]
    pub fn subscribe(&self, kinds: &[TransitionKind]) -> Subscription {
        let kinds = if kinds.is_empty() {
            vec![TransitionKind::Entered, TransitionKind::Exited]
        } else {
            kinds.to_vec()
        };

        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<TransitionEvent>(self.stream_capacity);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.insert(id, SubscriberEntry { kinds, tx });
        }
        tracing::debug!(subscription = ?id, "subscriber registered");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.subscribers),
            unregistered: AtomicBool::new(false),
        }
    }

    /// Delivers `event` to every matching subscriber. Returns how many got it.
    pub fn publish(&self, event: &TransitionEvent) -> usize {
        let Ok(subs) = self.subscribers.lock() else {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            return 0;
        };

        let mut delivered = 0;
        for sub in subs.values().filter(|s| s.kinds.contains(&event.kind)) {
            // Never block the emitter: drop if the subscriber is slow or gone.
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.dropped_events.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        delivered
    }

    /// Removes every subscriber. Their streams disconnect once drained.
    pub fn unsubscribe_all(&self) {
        if let Ok(mut subs) = self.subscribers.lock() {
            let count = subs.len();
            subs.clear();
            tracing::debug!(count, "all subscribers removed");
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Events that could not be delivered because a stream was full or closed.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A subscriber's stream of transition events.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<TransitionEvent>,
    registry: Weak<Registry>,
    unregistered: AtomicBool,
}

impl Subscription {
    /// The id backing this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Explicit unregistration. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut subs) = registry.lock() {
                subs.remove(&self.id);
            }
        }
    }

    /// Next event, blocking until one arrives. `None` once disconnected.
    #[must_use]
    pub fn recv(&self) -> Option<TransitionEvent> {
        self.rx.recv().ok()
    }

    /// Next event, waiting at most `timeout`.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TransitionEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Next buffered event, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<TransitionEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains every buffered event.
    #[must_use]
    pub fn drain(&self) -> Vec<TransitionEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
