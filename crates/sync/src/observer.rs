// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Observer registry for lifecycle notifications.
//!
//! Handlers are registered and removed by id. Emission iterates a snapshot
//! taken under the lock, so a handler may subscribe or unsubscribe (itself
//! included) while an emission is in progress. A panicking handler is logged
//! and skipped; the remaining handlers still run.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::warn;

/// Identifier assigned to a registered handler.
pub type ObserverId = u64;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: ObserverId,
    handlers: Vec<(ObserverId, Handler<E>)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A list of event handlers.
///
/// Cloning yields another handle to the same list.
pub struct ObserverList<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> ObserverList<E> {
    pub fn new() -> Self {
        ObserverList {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler. The returned [`Subscription`] removes it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription::new(id, move || {
            if let Some(registry) = weak.upgrade() {
                lock(&registry).handlers.retain(|(h, _)| *h != id);
            }
        })
    }

    /// Remove a handler by id. Returns whether it was registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.handlers.len();
        registry.handlers.retain(|(h, _)| *h != id);
        registry.handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        lock(&self.registry).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every handler registered at the time of the call.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<(ObserverId, Handler<E>)> = lock(&self.registry).handlers.clone();

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Observer {} panicked while handling an event", id),
            }
        }
        delivered
    }
}

impl<E: 'static> Default for ObserverList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ObserverList<E> {
    fn clone(&self) -> Self {
        ObserverList {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> fmt::Debug for ObserverList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("handlers", &lock(&self.registry).handlers.len())
            .finish()
    }
}

/// Handle returned when registering a handler.
///
/// Dropping it leaves the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    id: ObserverId,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap an arbitrary removal action.
    pub fn new<F>(id: ObserverId, cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Subscription {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Id of the registered handler.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Remove the handler.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
