/*!
Save lifecycle notifications.

Extensions subscribe to [`SaveEvents::saving`] to flush state into their cells
right before a save, and to [`SaveEvents::loaded`] to react once the store has
been reconciled. A failing or panicking callback is logged and skipped so one
misbehaving extension cannot block everyone else's saves.
*/

use crate::error::BoxError;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type Callback = Arc<dyn Fn() -> std::result::Result<(), BoxError> + Send + Sync>;

/// Ordered list of callbacks
pub struct Event {
    name: &'static str,
    subscribed: RwLock<Vec<Callback>>,
}

impl Event {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribed: RwLock::new(Vec::new()),
        }
    }

    /// Add a callback; callbacks run in subscription order
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn() -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribed.write().push(Arc::new(callback));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribed.read().len()
    }

    /// Run every callback, returning how many of them failed
    pub fn invoke(&self) -> usize {
        // Clone the list so a callback may subscribe without deadlocking
        let callbacks = self.subscribed.read().clone();
        let mut failures = 0;

        for (index, callback) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(event = self.name, index, error = %e, "Event callback failed");
                }
                Err(_) => {
                    failures += 1;
                    tracing::error!(event = self.name, index, "Event callback panicked");
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// The two lifecycle points the engine reports
#[derive(Debug)]
pub struct SaveEvents {
    /// Fired right before the store is written
    pub saving: Event,
    /// Fired once a load has finished, whatever its outcome
    pub loaded: Event,
}

impl SaveEvents {
    pub fn new() -> Self {
        Self {
            saving: Event::new("saving"),
            loaded: Event::new("loaded"),
        }
    }
}

impl Default for SaveEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_callbacks_run_in_order() {
        let event = Event::new("saving");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = Arc::clone(&seen);
            event.subscribe(move || {
                seen.lock().push(i);
                Ok(())
            });
        }

        assert_eq!(event.invoke(), 0);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failures_do_not_stop_later_callbacks() {
        let event = Event::new("loaded");
        let reached = Arc::new(Mutex::new(false));

        event.subscribe(|| Err("extension not ready".into()));
        event.subscribe(|| panic!("extension bug"));
        let flag = Arc::clone(&reached);
        event.subscribe(move || {
            *flag.lock() = true;
            Ok(())
        });

        assert_eq!(event.invoke(), 2);
        assert!(*reached.lock());
    }

    #[test]
    fn test_empty_event() {
        let events = SaveEvents::default();
        assert_eq!(events.saving.invoke(), 0);
        assert_eq!(events.loaded.subscriber_count(), 0);
    }
}
