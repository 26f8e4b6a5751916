// Fan-out of one event stream to many live subscribers

use serde::Serialize;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::debug;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Queue depth per subscriber when none is configured.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 10;

/// Broadcast hub: one producer side, any number of bounded subscriber queues.
///
/// Publishing never waits on a subscriber. A subscriber whose queue is full
/// simply misses that event; everyone else still gets it.
///
/// Cloning is cheap and every clone refers to the same subscriber set.
pub struct BroadcastHub<T> {
    inner: Arc<HubInner<T>>,
}

struct HubInner<T> {
    name: &'static str,
    capacity: usize,
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<T>>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Per-call delivery result of [`BroadcastHub::publish`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Lifetime counters, exposed on the health endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct HubStats {
    pub hub: &'static str,
    pub capacity: usize,
    pub subscribers: usize,
    pub published: u64,
    pub dropped: u64,
}

impl<T> Clone for BroadcastHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> HubInner<T> {
    fn read_subscribers(&self) -> RwLockReadGuard<'_, HashMap<Uuid, mpsc::Sender<T>>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_subscribers(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, mpsc::Sender<T>>> {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: &Uuid) -> bool {
        self.write_subscribers().remove(id).is_some()
    }
}

impl<T: Clone + Send + 'static> BroadcastHub<T> {
    /// Create a hub whose subscribers each buffer up to `capacity` events.
    ///
    /// A zero capacity is bumped to 1, tokio channels cannot be unbuffered.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                name,
                capacity: capacity.max(1),
                subscribers: RwLock::new(HashMap::new()),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Register a new subscriber queue.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();

        self.inner.write_subscribers().insert(id, tx);
        debug!(hub = self.inner.name, subscription_id = %id, "Subscriber registered");

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Deliver `event` to every registered subscriber without blocking.
    pub fn publish(&self, event: T) -> PublishReport {
        let mut report = PublishReport::default();

        {
            let subscribers = self.inner.read_subscribers();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.dropped += 1;
                        debug!(hub = self.inner.name, subscription_id = %id, "Subscriber queue full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => report.dropped += 1,
                }
            }
        }

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        self.inner
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read_subscribers().len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            hub: self.name(),
            capacity: self.capacity(),
            subscribers: self.subscriber_count(),
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Receiving end of one hub registration.
///
/// Dropping the handle unsubscribes it.
pub struct Subscription<T> {
    id: Uuid,
    rx: mpsc::Receiver<T>,
    hub: Weak<HubInner<T>>,
    active: bool,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True until `unsubscribe` runs.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Wait for the next event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next queued event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Remove this queue from the hub and close it.
    ///
    /// Returns true only for the call that actually removed the registration;
    /// later calls are no-ops.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.rx.close();

        match self.hub.upgrade() {
            Some(hub) => {
                let removed = hub.remove(&self.id);
                debug!(hub = hub.name, subscription_id = %self.id, "Subscriber removed");
                removed
            }
            None => false,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
