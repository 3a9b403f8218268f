//! Feeds deliver items (event batches, balances) to registered handlers; a
//! [`Subscription`] owns the single release of one registration.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use relay_watch_domain::EventBatch;

/// Returned by a handler after each delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Continue,
    /// Unregister this handler before anything else is delivered to it.
    Done,
}

pub type Handler<T> = Box<dyn FnMut(&T) -> Delivery + Send>;
pub type BatchHandler = Handler<EventBatch>;

type ReleaseAction = Box<dyn FnOnce() + Send>;

struct ReleaseOnce {
    action: Mutex<Option<ReleaseAction>>,
}

impl ReleaseOnce {
    fn run(&self) {
        let action = self
            .action
            .lock()
            .expect("subscription mutex poisoned")
            .take();
        if let Some(action) = action {
            action();
        }
    }

    fn is_done(&self) -> bool {
        self.action
            .lock()
            .expect("subscription mutex poisoned")
            .is_none()
    }
}

/// An active registration against a feed.
///
/// Release runs its action at most once; later calls are no-ops. Dropping the
/// subscription releases it.
#[must_use = "dropping a subscription releases it immediately"]
pub struct Subscription {
    inner: Arc<ReleaseOnce>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(ReleaseOnce {
                action: Mutex::new(Some(Box::new(release))),
            }),
        }
    }

    pub fn release(&self) {
        self.inner.run();
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_done()
    }

    /// Lets a third party cancel the registration without owning it.
    pub fn handle(&self) -> ReleaseHandle {
        ReleaseHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Non-owning release capability. Dropping it does nothing.
#[derive(Clone)]
pub struct ReleaseHandle {
    inner: Arc<ReleaseOnce>,
}

impl ReleaseHandle {
    pub fn release(&self) {
        self.inner.run();
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_done()
    }
}

/// Continuous source of event batches from one ledger.
pub trait EventFeed: Send + Sync {
    fn subscribe(&self, handler: BatchHandler) -> Subscription;
}

impl<F> EventFeed for Arc<F>
where
    F: EventFeed + ?Sized,
{
    fn subscribe(&self, handler: BatchHandler) -> Subscription {
        (**self).subscribe(handler)
    }
}

struct Slot<T> {
    handler: Mutex<Option<Handler<T>>>,
}

struct Registry<T> {
    next_id: AtomicU64,
    slots: Mutex<BTreeMap<u64, Arc<Slot<T>>>>,
}

impl<T> Registry<T> {
    fn remove(&self, id: u64) {
        let slot = self
            .slots
            .lock()
            .expect("feed registry mutex poisoned")
            .remove(&id);
        // Waits for an in-flight delivery to this handler to finish.
        if let Some(slot) = slot {
            slot.handler
                .lock()
                .expect("feed handler mutex poisoned")
                .take();
        }
    }
}

/// In-process hub that hands every published item to each live handler, in
/// registration order, synchronously.
///
/// Handlers must not release their own subscription from inside the
/// handler; they return [`Delivery::Done`] instead.
pub struct Broadcaster<T> {
    registry: Arc<Registry<T>>,
}

/// Hub for one ledger's finalized event batches.
pub type EventHub = Broadcaster<EventBatch>;

impl<T: 'static> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                slots: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn subscribe(&self, handler: Handler<T>) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot {
            handler: Mutex::new(Some(handler)),
        });
        self.registry
            .slots
            .lock()
            .expect("feed registry mutex poisoned")
            .insert(id, slot);

        let registry = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(id);
            }
        })
    }

    /// Delivers `item` to every live handler and returns how many saw it.
    pub fn publish(&self, item: &T) -> usize {
        let snapshot: Vec<(u64, Arc<Slot<T>>)> = self
            .registry
            .slots
            .lock()
            .expect("feed registry mutex poisoned")
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let mut delivered = 0;
        for (id, slot) in snapshot {
            let mut guard = slot.handler.lock().expect("feed handler mutex poisoned");
            let Some(handler) = guard.as_mut() else {
                continue;
            };
            delivered += 1;
            if handler(item) == Delivery::Done {
                guard.take();
                drop(guard);
                self.registry
                    .slots
                    .lock()
                    .expect("feed registry mutex poisoned")
                    .remove(&id);
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .slots
            .lock()
            .expect("feed registry mutex poisoned")
            .len()
    }
}

impl<T: 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl EventFeed for Broadcaster<EventBatch> {
    fn subscribe(&self, handler: BatchHandler) -> Subscription {
        Broadcaster::subscribe(self, handler)
    }
}
