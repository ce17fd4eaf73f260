use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::oneshot;
use tracing::warn;

use crate::record::{EventKind, EventRecord};
use crate::error::ListenerError;

use super::once::Once;

/// A subscriber callback. Failures are reported, never propagated.
pub type Handler = Arc<dyn Fn(&EventRecord) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    handler: Handler,
    once: bool,
}

#[derive(Default)]
struct RegistryInner {
    listeners: RwLock<HashMap<EventKind, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }
}

/// Outcome of dispatching one record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Maps event kinds to handlers.
///
/// Handlers for a kind run in registration order. The registry lock is
/// released before any handler runs, so handlers may subscribe, unsubscribe
/// or emit from inside a callback. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, kind: EventKind, handler: Handler, once: bool) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners
            .entry(kind)
            .or_default()
            .push(Entry { id, handler, once });
        id
    }

    fn subscription(&self, entries: Vec<(EventKind, ListenerId)>) -> Subscription {
        Subscription {
            registry: Arc::downgrade(&self.inner),
            entries,
        }
    }

    /// Register an infallible handler.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        self.try_on(kind, move |event| {
            handler(event);
            Ok(())
        })
    }

    /// Register a handler that may fail; failures are logged and counted.
    pub fn try_on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EventRecord) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = self.insert(kind, Arc::new(handler), false);
        self.subscription(vec![(kind, id)])
    }

    /// One handler across several kinds; the subscription removes all of them.
    pub fn on_many<F>(&self, kinds: &[EventKind], handler: F) -> Subscription
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |event: &EventRecord| {
            handler(event);
            Ok(())
        });
        let mut entries = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if entries.iter().any(|(k, _)| k == kind) {
                continue;
            }
            let id = self.insert(*kind, Arc::clone(&handler), false);
            entries.push((*kind, id));
        }
        self.subscription(entries)
    }

    /// Remove a handler. Returns false if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.remove(kind, id)
    }

    /// Resolve with the next record of `kind`. Past records are not replayed.
    pub fn once(&self, kind: EventKind) -> Once {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let handler: Handler = Arc::new(move |event: &EventRecord| {
            let sender = slot
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            if let Some(sender) = sender {
                // The waiter may have been dropped; that is not a failure.
                let _ = sender.send(event.clone());
            }
            Ok(())
        });
        self.insert(kind, handler, true);
        Once::new(rx)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Run every handler registered for the record's kind.
    ///
    /// A failing or panicking handler is logged and skipped; the rest still
    /// run.
    pub fn dispatch(&self, event: &EventRecord) -> DispatchReport {
        let entries = {
            let mut listeners = self
                .inner
                .listeners
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let Some(registered) = listeners.get_mut(&event.kind()) else {
                return DispatchReport::default();
            };
            let snapshot = registered.clone();
            registered.retain(|entry| !entry.once);
            if registered.is_empty() {
                listeners.remove(&event.kind());
            }
            snapshot
        };

        let mut report = DispatchReport::default();
        for entry in entries {
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.handler)(event)))
                .unwrap_or_else(|panic| Err(ListenerError::Panicked(panic_message(&*panic))));
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        listener = entry.id.0,
                        kind = %event.kind(),
                        event_id = %event.id(),
                        error = %err,
                        "listener failed; continuing dispatch"
                    );
                }
            }
        }
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Capability to remove a registered handler.
///
/// Dropping a `Subscription` leaves the handler registered; call
/// `unsubscribe` or convert it with `into_guard`.
#[must_use = "dropping a Subscription keeps the handler registered"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    entries: Vec<(EventKind, ListenerId)>,
}

impl Subscription {
    pub fn ids(&self) -> impl Iterator<Item = (EventKind, ListenerId)> + '_ {
        self.entries.iter().copied()
    }

    pub fn unsubscribe(mut self) {
        self.remove_all();
    }

    /// Unsubscribe automatically when the guard is dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }

    fn remove_all(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            for (kind, id) in self.entries.drain(..) {
                registry.remove(kind, id);
            }
        }
    }
}

pub struct SubscriptionGuard(Subscription);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.remove_all();
    }
}
