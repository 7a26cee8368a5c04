//! Explicit observer-list event emitter
//!
//! Trust state changes fan out to multiple subscribers (request layer,
//! extension host gates, multiple windows). Listeners are plain closures;
//! a `Subscription` unregisters its listener when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ListenerList<T> = Vec<(u64, Listener<T>)>;

pub struct EventEmitter<T> {
    listeners: Arc<Mutex<ListenerList<T>>>,
    next_id: AtomicU64,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        EventEmitter {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; dropping the returned subscription removes it.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .expect("event listener list poisoned")
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Invoke all listeners in registration order.
    ///
    /// The list is snapshotted first so listeners may subscribe or
    /// unsubscribe re-entrantly without deadlocking.
    pub fn fire(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .expect("event listener list poisoned")
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .expect("event listener list poisoned")
            .len()
    }

    /// Remove all listeners without invoking them.
    pub fn dispose(&self) {
        self.listeners
            .lock()
            .expect("event listener list poisoned")
            .clear();
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle tying a listener's lifetime to a scope
pub struct Subscription<T> {
    id: u64,
    listeners: Weak<Mutex<ListenerList<T>>>,
}

impl<T> Subscription<T> {
    /// Explicitly unregister (identical to dropping the handle)
    pub fn dispose(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .expect("event listener list poisoned")
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fire_reaches_all_listeners_in_order() {
        let emitter = EventEmitter::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        let _sub1 = emitter.subscribe(move |v| s1.lock().unwrap().push(("first", *v)));
        let s2 = seen.clone();
        let _sub2 = emitter.subscribe(move |v| s2.lock().unwrap().push(("second", *v)));

        emitter.fire(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        let emitter = EventEmitter::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = emitter.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        emitter.fire(&());
        sub.dispose();
        emitter.fire(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_dispose_clears_without_invoking() {
        let emitter = EventEmitter::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _sub = emitter.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        emitter.dispose();
        emitter.fire(&());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
