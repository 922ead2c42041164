//! Explicit observer registries
//!
//! Observers are held by strong reference under a handle returned at
//! registration. Notification is a synchronous fan-out on the caller's thread
//! over a snapshot of the registry, so observers may register or unregister
//! from inside a callback.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverHandle(u64);

/// Registry of observers of type `T`
pub struct ObserverRegistry<T: ?Sized> {
    next_handle: AtomicU64,
    observers: RwLock<Vec<(ObserverHandle, Arc<T>)>>,
}

impl<T: ?Sized> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Add an observer
    pub fn register(&self, observer: Arc<T>) -> ObserverHandle {
        let handle = ObserverHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((handle, observer));
        handle
    }

    /// Remove an observer; returns false if the handle is unknown
    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(h, _)| *h != handle);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub fn clear(&self) {
        self.observers.write().clear();
    }

    /// Current observers in registration order
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    /// Call `f` on every observer, returning how many were notified
    pub fn notify(&self, mut f: impl FnMut(&T)) -> usize {
        let observers = self.snapshot();
        for observer in &observers {
            f(observer);
        }
        observers.len()
    }
}

impl<T: ?Sized> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ObserverRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
