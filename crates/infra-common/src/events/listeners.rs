//! Typed listener registries
//!
//! A [`ListenerRegistry`] holds an ordered set of callbacks of one listener type
//! (usually a trait object such as `dyn SessionListener`). Registration and
//! removal are thread-safe; notification invokes every listener synchronously,
//! in registration order, on the calling task.
//!
//! Notification works on a snapshot of the registered set, so a listener may
//! register or remove listeners (including itself) from inside a callback
//! without deadlocking. Such changes take effect from the next notification.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use siphon_infra_common::ListenerRegistry;
//!
//! trait Counter: Send + Sync {
//!     fn bump(&self);
//! }
//!
//! struct Hits(AtomicUsize);
//! impl Counter for Hits {
//!     fn bump(&self) { self.0.fetch_add(1, Ordering::SeqCst); }
//! }
//!
//! let registry: ListenerRegistry<dyn Counter> = ListenerRegistry::new();
//! let hits = Arc::new(Hits(AtomicUsize::new(0)));
//! let id = registry.add(hits.clone());
//! registry.notify(|l| l.bump());
//! assert!(registry.remove(id));
//! registry.notify(|l| l.bump());
//! assert_eq!(hits.0.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Handle returned on registration, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Ordered, thread-safe set of listeners of type `L`
pub struct ListenerRegistry<L: ?Sized> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener; it is notified after every listener registered before it
    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Remove every listener
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Invoke `f` on every registered listener, in registration order
    pub fn notify<F>(&self, mut f: F)
    where
        F: FnMut(&L),
    {
        let snapshot: Vec<Arc<L>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            f(&listener);
        }
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    trait Recorder: Send + Sync {
        fn record(&self, out: &Mutex<Vec<&'static str>>);
    }

    struct Named(&'static str);

    impl Recorder for Named {
        fn record(&self, out: &Mutex<Vec<&'static str>>) {
            out.lock().push(self.0);
        }
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let registry: ListenerRegistry<dyn Recorder> = ListenerRegistry::new();
        registry.add(Arc::new(Named("first")));
        registry.add(Arc::new(Named("second")));
        registry.add(Arc::new(Named("third")));

        let out = Mutex::new(Vec::new());
        registry.notify(|l| l.record(&out));
        assert_eq!(*out.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry: ListenerRegistry<dyn Recorder> = ListenerRegistry::new();
        let id = registry.add(Arc::new(Named("only")));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listener_may_mutate_registry_during_notify() {
        let registry: Arc<ListenerRegistry<dyn Fn() + Send + Sync>> = Arc::new(ListenerRegistry::new());
        let inner = registry.clone();
        registry.add(Arc::new(move || {
            inner.add(Arc::new(|| {}));
        }));

        registry.notify(|l| l());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_add_remove() {
        let registry: Arc<ListenerRegistry<dyn Recorder>> = Arc::new(ListenerRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let id = registry.add(Arc::new(Named("tmp")));
                        assert!(registry.remove(id));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
