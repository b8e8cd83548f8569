//! Typed observer lists.
//!
//! Each event stream gets its own [`ObserverList`].  Adding a listener hands
//! back a [`ListenerId`]; that token is the only way to remove it again.
//! Listeners are called synchronously, in registration order, and never while
//! the list's lock is held, so a listener may add or remove listeners itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

// Process-wide so a token from one list can never remove a listener of another.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Capability token returned when a listener is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct ObserverList<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener<T>)>> {
        // Listeners never run under this lock, so poisoning cannot leave the
        // list half-updated.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.guard().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` is not registered here.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.guard();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .guard()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(value);
        }
    }
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}
