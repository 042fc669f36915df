//! Fan-out of accepted vehicle reports to live observers.
//!
//! Every subscriber is a [`Sink`] registered under a [`SubscriberId`]. A
//! publish walks the registered set once and hands the report to each sink
//! without waiting on it. Sinks that fail (closed, full, or otherwise broken)
//! are removed before `publish` returns and never affect the others.
//!
//! The hub holds no backlog: a subscriber only sees reports published while it
//! is registered.
//!
//! Most transports use [`BroadcastHub::subscribe`], which returns a
//! channel-backed [`Subscription`] that unregisters itself when dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::vehicles::VehicleReport;

/// Per-subscriber queue length used by [`BroadcastHub::default`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Opaque handle identifying one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber queue is full")]
    Full,

    #[error("subscriber has disconnected")]
    Closed,

    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Destination for published reports.
///
/// `deliver` is called with the hub's registry lock held, so it must not
/// block or call back into the hub. Returning an error unregisters the sink.
pub trait Sink: Send + Sync {
    fn deliver(&self, report: &Arc<VehicleReport>) -> Result<(), DeliveryError>;
}

impl Sink for mpsc::Sender<Arc<VehicleReport>> {
    fn deliver(&self, report: &Arc<VehicleReport>) -> Result<(), DeliveryError> {
        self.try_send(Arc::clone(report)).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Result of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Sink>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl BroadcastHub {
    /// `queue_capacity` bounds how many undelivered reports a channel-backed
    /// subscriber may accumulate before it is treated as too slow and dropped.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, Arc<dyn Sink>>> {
        // A panicking sink must not take the hub down with it.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an arbitrary sink.
    pub fn register(&self, sink: Arc<dyn Sink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut registry = self.registry();
            registry.insert(id, sink);
            registry.len()
        };
        debug!(subscriber = %id, subscribers = count, "Subscriber registered");
        id
    }

    /// Registers a channel-backed subscriber.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = self.register(Arc::new(tx));
        Subscription {
            id,
            hub: Arc::clone(self),
            rx,
        }
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        // The guard is released at the end of this statement, before the
        // sink is dropped.
        let removed = self.registry().remove(&id);
        let Some(sink) = removed else {
            return false;
        };
        drop(sink);
        debug!(subscriber = %id, "Subscriber removed");
        true
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.registry().contains_key(&id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    /// Hands `report` to every registered sink.
    ///
    /// Holding the registry lock for the whole walk keeps successive publishes
    /// in order for each subscriber. Sinks are non-blocking, so the walk is
    /// bounded by the number of subscribers. Failed sinks are dropped only
    /// after the lock is released, so a sink's `Drop` may call back into the
    /// hub.
    pub fn publish(&self, report: VehicleReport) -> PublishOutcome {
        let report = Arc::new(report);

        let (outcome, failed, removed) = {
            let mut registry = self.registry();

            let failed: Vec<(SubscriberId, DeliveryError)> = registry
                .iter()
                .filter_map(|(id, sink)| sink.deliver(&report).err().map(|e| (*id, e)))
                .collect();

            let removed: Vec<Arc<dyn Sink>> =
                failed.iter().filter_map(|(id, _)| registry.remove(id)).collect();

            let outcome = PublishOutcome {
                delivered: registry.len(),
                dropped: failed.len(),
            };
            (outcome, failed, removed)
        };
        drop(removed);

        for (id, error) in &failed {
            debug!(subscriber = %id, error = %error, "Dropping subscriber after failed delivery");
        }

        outcome
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Channel-backed subscriber handle. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    hub: Arc<BroadcastHub>,
    rx: mpsc::Receiver<Arc<VehicleReport>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next report, or `None` once the hub has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<VehicleReport>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<VehicleReport>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
