//! Publication hub: fan-out of snapshots to subscribed observers.
//!
//! The hub keeps exactly one current snapshot and a map of observers, each
//! with its own bounded queue. Both live under a single mutex, so a new
//! observer's first message is always the full current snapshot and every
//! observer sees publishes in order. Sends never block: a closed or full
//! queue removes that observer and delivery to the others carries on.

use ahash::AHashMap as HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::snapshot::Snapshot;

pub type ObserverId = u64;

/// Receiving side of one observer registration.
pub struct Subscription {
    id: ObserverId,
    receiver: mpsc::Receiver<Arc<Snapshot>>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next snapshot, or `None` once the hub dropped this observer.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.try_recv().ok()
    }
}

/// Delivery summary of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

struct HubInner {
    current: Option<Arc<Snapshot>>,
    observers: HashMap<ObserverId, mpsc::Sender<Arc<Snapshot>>>,
    closed: bool,
}

pub struct PublicationHub {
    inner: Mutex<HubInner>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

enum Delivery {
    Sent,
    Dropped,
}

fn deliver(id: ObserverId, sender: &mpsc::Sender<Arc<Snapshot>>, snapshot: &Arc<Snapshot>) -> Delivery {
    match sender.try_send(Arc::clone(snapshot)) {
        Ok(()) => Delivery::Sent,
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("Observer {} disconnected", id);
            Delivery::Dropped
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Observer {} queue full, dropping slow consumer", id);
            Delivery::Dropped
        }
    }
}

impl PublicationHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                current: None,
                observers: HashMap::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers an observer and queues the current snapshot for it, if any.
    ///
    /// After [`PublicationHub::close_all`] the returned subscription is
    /// already closed.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        let mut inner = self.lock();
        if inner.closed {
            debug!("Hub closed, rejecting observer {}", id);
            return Subscription { id, receiver };
        }
        if let Some(current) = &inner.current {
            if let Delivery::Dropped = deliver(id, &sender, current) {
                return Subscription { id, receiver };
            }
        }
        inner.observers.insert(id, sender);
        debug!("Observer {} subscribed ({} active)", id, inner.observers.len());

        Subscription { id, receiver }
    }

    /// Removes an observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.lock().observers.remove(&id).is_some();
        if removed {
            debug!("Observer {} unsubscribed", id);
        }
        removed
    }

    /// Replaces the current snapshot and fans it out to every observer.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> PublishReport {
        let mut inner = self.lock();
        let mut report = PublishReport::default();

        inner.observers.retain(|id, sender| match deliver(*id, sender, &snapshot) {
            Delivery::Sent => {
                report.delivered += 1;
                true
            }
            Delivery::Dropped => {
                report.dropped += 1;
                false
            }
        });
        inner.current = Some(snapshot);

        debug!(
            "Published snapshot to {} observers ({} dropped)",
            report.delivered, report.dropped
        );
        report
    }

    /// Re-sends the current snapshot to one observer, changed or not.
    ///
    /// Returns false if there is nothing to send yet or the observer is gone.
    pub fn on_refresh_request(&self, id: ObserverId) -> bool {
        let mut inner = self.lock();
        let Some(current) = inner.current.clone() else {
            return false;
        };
        let Some(sender) = inner.observers.get(&id) else {
            return false;
        };
        match deliver(id, sender, &current) {
            Delivery::Sent => true,
            Delivery::Dropped => {
                inner.observers.remove(&id);
                false
            }
        }
    }

    /// Latest published snapshot, `None` before the first publish.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.lock().current.clone()
    }

    pub fn is_privileged_observer(&self) -> Option<bool> {
        self.lock()
            .current
            .as_ref()
            .map(|s| s.is_privileged_observer())
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Drops every observer queue and refuses new subscriptions.
    pub fn close_all(&self) {
        let mut inner = self.lock();
        let count = inner.observers.len();
        inner.observers.clear();
        inner.closed = true;
        info!("Publication hub closed, disconnected {} observers", count);
    }
}
