//! Subscriber registry for snapshot fan-out.
//!
//! Each subscriber owns a single-slot mailbox. Publishing overwrites the slot
//! instead of queueing behind it, so a stalled viewer costs one snapshot
//! reference and never slows the publisher or its peers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use pulse_proto::Snapshot;
use tokio::sync::watch;
use tracing::trace;

/// Identifier of a registered subscriber, unique within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Get the raw numeric id.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Slot = watch::Sender<Option<Snapshot>>;

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    slots: RwLock<HashMap<SubscriberId, Slot>>,
}

impl RegistryInner {
    fn remove(&self, id: SubscriberId) -> bool {
        // Dropping the sender closes the slot for its receiver.
        self.slots.write().remove(&id).is_some()
    }
}

/// Concurrency-safe set of subscribers.
///
/// Cloning the registry yields another handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber with an empty mailbox.
    pub fn subscribe(&self) -> Subscriber {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = watch::channel(None);
        self.inner.slots.write().insert(id, tx);
        trace!(subscriber = %id, "subscriber added");

        Subscriber {
            id,
            rx,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Remove a subscriber and close its mailbox.
    ///
    /// Consuming the handle makes a second unsubscribe unrepresentable.
    /// Dropping a [`Subscriber`] has the same effect.
    pub fn unsubscribe(&self, subscriber: Subscriber) {
        drop(subscriber);
    }

    /// Offer a snapshot to every live subscriber without waiting on any of them.
    ///
    /// A subscriber that has not consumed its previous snapshot has it replaced,
    /// so it only ever sees the latest one. Returns the number of subscribers
    /// whose mailbox now holds `snapshot`.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        let slots = self.inner.slots.read();
        for slot in slots.values() {
            slot.send_replace(Some(Arc::clone(&snapshot)));
        }
        trace!(subscribers = slots.len(), "snapshot published");
        slots.len()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.slots.read().len()
    }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a subscriber with this id is still registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.slots.read().contains_key(&id)
    }
}

/// Receiving side of a registry subscription.
///
/// Unregisters itself when dropped.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    rx: watch::Receiver<Option<Snapshot>>,
    registry: Arc<RegistryInner>,
}

impl Subscriber {
    /// This subscriber's id.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next snapshot not yet seen by this subscriber.
    ///
    /// Returns `None` once the subscriber has been removed from the registry.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }

    /// Take the pending snapshot, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// Whether a snapshot is waiting to be received.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            trace!(subscriber = %self.id, "subscriber removed");
        }
    }
}
