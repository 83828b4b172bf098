// live.rs
//! Push-based live values: producers publish snapshots, observers register a
//! callback and get a handle that unregisters them when cancelled or dropped.
//!
//! Observers run synchronously on the publishing thread and must not call back
//! into the producer that notifies them.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    observers: Vec<(u64, Observer<T>)>,
}

pub struct Publisher<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Publisher<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hands `initial` to the observer right away, then keeps it registered
    /// for every later `publish`.
    pub fn register<F>(&self, initial: &T, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let observer: Observer<T> = Arc::new(observer);
        observer(initial);

        let id = {
            let mut reg = self.lock();
            let id = reg.next_id;
            reg.next_id += 1;
            reg.observers.push((id, observer));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    let mut reg = registry.lock().unwrap_or_else(|e| e.into_inner());
                    reg.observers.retain(|(oid, _)| *oid != id);
                }
            })),
        }
    }

    pub fn publish(&self, value: &T) {
        // Snapshot the observer list so a subscription dropped from inside a
        // callback cannot deadlock on the registry.
        let observers: Vec<Observer<T>> =
            self.lock().observers.iter().map(|(_, o)| o.clone()).collect();
        for observer in observers {
            observer(value);
        }
    }

    #[cfg(test)]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

/// Keeps an observer registered. Dropping it (or calling `cancel`) stops
/// further notifications.
#[must_use = "dropping a Subscription unregisters the observer"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}
