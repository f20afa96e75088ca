//! Change-notification registries
//!
//! Callbacks are stored behind `Arc` and copied out before each
//! notification, so a callback may register or cancel subscriptions
//! (including its own) while it runs. A cancelled `CancellationToken`
//! deregisters its callback; cancelled entries are pruned on the next
//! notification and are never invoked again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Callback for "data changed".
pub type UpdateFn = dyn Fn() + Send + Sync;
/// Callback for "new field discovered"; receives the field name.
pub type KeyUpdateFn = dyn Fn(&str) + Send + Sync;

/// Ids are unique across registries so one id never names two callbacks.
static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(0);

/// Handle returned by a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Entry<F: ?Sized> {
    id: SubscriptionId,
    callback: Arc<F>,
    signal: Option<CancellationToken>,
}

/// A set of callbacks of one kind.
pub struct Subscribers<F: ?Sized> {
    entries: Mutex<Vec<Entry<F>>>,
}

impl<F: ?Sized> Subscribers<F> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register `callback`. Returns `None` without registering when
    /// `signal` is already cancelled.
    pub fn add(
        &self,
        callback: Arc<F>,
        signal: Option<CancellationToken>,
    ) -> Option<SubscriptionId> {
        if signal.as_ref().is_some_and(|s| s.is_cancelled()) {
            return None;
        }
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry {
            id,
            callback,
            signal,
        });
        Some(id)
    }

    /// Deregister by id. Returns whether anything was removed.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Live callbacks in registration order.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        let mut entries = self.lock();
        entries.retain(|e| !e.signal.as_ref().is_some_and(|s| s.is_cancelled()));
        entries.iter().map(|e| Arc::clone(&e.callback)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| !e.signal.as_ref().is_some_and(|s| s.is_cancelled()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry<F>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: ?Sized> Default for Subscribers<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscribers<UpdateFn> {
    pub fn notify(&self) {
        for callback in self.snapshot() {
            callback();
        }
    }
}

impl Subscribers<KeyUpdateFn> {
    pub fn notify(&self, key: &str) {
        for callback in self.snapshot() {
            callback(key);
        }
    }
}
