//! Handle-returning publish/subscribe registry.
//!
//! Callbacks are registered per event name and invoked synchronously, in
//! registration order, on every [`EventDispatcher::publish`]. Each publish
//! works on a snapshot of the registrations taken before the first
//! callback runs, so subscribing or unsubscribing from inside a callback
//! only affects later publishes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A subscriber callback receiving the published payload by reference.
pub type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Opaque token identifying one registration.
///
/// Handles are allocated from a monotonically increasing counter and are
/// never reused within a dispatcher, so registering the same callback twice
/// yields two distinct handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A subscriber that panicked while handling an event.
///
/// Faults are contained by the dispatcher: they are logged and counted in
/// the [`PublishOutcome`] but never propagated to the publisher.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Subscriber {handle} for '{event}' panicked: {message}")]
pub struct SubscriberFault {
    pub event: String,
    pub handle: SubscriptionHandle,
    pub message: String,
}

impl SubscriberFault {
    fn from_panic(event: &str, handle: SubscriptionHandle, panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            event: event.to_string(),
            handle,
            message,
        }
    }
}

/// Result of a single [`EventDispatcher::publish`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Callbacks that were invoked (including the ones that faulted).
    pub invoked: usize,
    /// Callbacks that panicked.
    pub faulted: usize,
}

struct Registration<P> {
    handle: SubscriptionHandle,
    callback: Callback<P>,
}

// Manual impl: cloning a registration only clones the `Arc`, so `P` itself
// need not be `Clone`.
impl<P> Clone for Registration<P> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Event-name keyed registry of subscriber callbacks.
///
/// Designed to be shared via `Arc<EventDispatcher<P>>` between the
/// connection manager, the native notification bridge and application code.
pub struct EventDispatcher<P> {
    registry: Mutex<HashMap<String, Vec<Registration<P>>>>,
    next_handle: AtomicU64,
}

impl<P> EventDispatcher<P> {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Register `callback` at the end of `event`'s subscriber list.
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.subscribe_callback(event, Arc::new(callback))
    }

    /// Register an already shared callback.
    ///
    /// The same `Arc` may be registered any number of times; every
    /// registration fires and each gets its own handle.
    pub fn subscribe_callback(
        &self,
        event: impl Into<String>,
        callback: Callback<P>,
    ) -> SubscriptionHandle {
        let event = event.into();
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(event = %event, %handle, "Subscriber registered");
        self.lock()
            .entry(event)
            .or_default()
            .push(Registration { handle, callback });
        handle
    }

    /// Remove the registration identified by `handle` from `event`.
    ///
    /// Returns `false` (and does nothing) when no such registration exists.
    pub fn unsubscribe(&self, event: &str, handle: SubscriptionHandle) -> bool {
        let mut registry = self.lock();
        let Some(list) = registry.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.handle == handle) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            registry.remove(event);
        }
        tracing::trace!(event, %handle, "Subscriber removed");
        true
    }

    /// Invoke every callback registered for `event`, in registration order.
    ///
    /// A callback that panics is logged as a [`SubscriberFault`] and the
    /// remaining callbacks still run. With no subscribers this is a no-op.
    pub fn publish(&self, event: &str, payload: &P) -> PublishOutcome {
        let snapshot: Vec<Registration<P>> = match self.lock().get(event) {
            Some(list) => list.clone(),
            None => return PublishOutcome::default(),
        };

        let mut outcome = PublishOutcome::default();
        for registration in snapshot {
            outcome.invoked += 1;
            let callback = &registration.callback;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                outcome.faulted += 1;
                let fault = SubscriberFault::from_panic(event, registration.handle, panic);
                tracing::error!(
                    event,
                    handle = %registration.handle,
                    error = %fault,
                    "Subscriber fault contained at dispatch boundary",
                );
            }
        }
        outcome
    }

    /// Number of registrations currently held for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    // Callbacks never run under the lock, so poisoning can only come from a
    // panic inside the registry bookkeeping itself; the map stays usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Registration<P>>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> Default for EventDispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_increasing() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let a = dispatcher.subscribe("tick", |_| {});
        let b = dispatcher.subscribe("tick", |_| {});
        let c = dispatcher.subscribe("tock", |_| {});
        assert!(a < b && b < c);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::default();
        assert_eq!(dispatcher.publish("nobody", &1), PublishOutcome::default());
    }

    #[test]
    fn unsubscribe_drops_empty_event_entry() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let h = dispatcher.subscribe("tick", |_| {});
        assert!(dispatcher.unsubscribe("tick", h));
        assert_eq!(dispatcher.subscriber_count("tick"), 0);
        assert!(dispatcher.lock().is_empty());
    }

    #[test]
    fn unsubscribe_with_wrong_event_name_is_noop() {
        let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
        let h = dispatcher.subscribe("tick", |_| {});
        assert!(!dispatcher.unsubscribe("tock", h));
        assert_eq!(dispatcher.subscriber_count("tick"), 1);
    }

    #[test]
    fn fault_message_is_extracted_from_panic_payload() {
        let fault = SubscriberFault::from_panic(
            "tick",
            SubscriptionHandle(3),
            Box::new(String::from("boom")),
        );
        assert_eq!(fault.message, "boom");
        assert_eq!(fault.to_string(), "Subscriber #3 for 'tick' panicked: boom");
    }
}
