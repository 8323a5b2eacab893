//! Session-idle observer list with drop-guard disposers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use crate::lock_unpoisoned;

pub type IdleCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(u64, IdleCallback)>,
}

/// Observers notified each time a session becomes idle.
#[derive(Clone, Default)]
pub struct IdleObservers {
    registry: Arc<Mutex<Registry>>,
}

impl IdleObservers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` until the returned subscription is dropped or
    /// unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> IdleSubscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut registry = lock_unpoisoned(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.callbacks.push((id, Arc::new(callback)));

        IdleSubscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Invokes every registered callback once with `session_id` and returns
    /// how many ran. Callbacks run on a snapshot taken outside the lock, so
    /// they may subscribe or unsubscribe freely. A panicking callback is
    /// logged and does not stop the others.
    pub fn notify(&self, session_id: &str) -> usize {
        let snapshot: Vec<(u64, IdleCallback)> = lock_unpoisoned(&self.registry)
            .callbacks
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        for (id, callback) in &snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(session_id)));
            if result.is_err() {
                warn!(session_id, observer = *id, "idle observer panicked");
            }
        }
        snapshot.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.registry).callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for IdleObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleObservers")
            .field("len", &self.len())
            .finish()
    }
}

/// Disposer returned by [`IdleObservers::subscribe`].
#[must_use = "dropping the subscription unregisters the callback"]
#[derive(Debug)]
pub struct IdleSubscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl IdleSubscription {
    pub fn unsubscribe(self) {}

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock_unpoisoned(&registry)
                .callbacks
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for IdleSubscription {
    fn drop(&mut self) {
        self.remove();
    }
}
