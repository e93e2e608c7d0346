//! Behaviour tests for `EventDispatcher`.
//!
//! Exercise ordering, removal, duplicate registration, fault containment
//! and snapshot semantics through the public API only.

use std::sync::{Arc, Mutex};

use rota_events::{Callback, EventDispatcher, PublishOutcome};

fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// ---------------------------------------------------------------------------
// Test: callbacks fire in registration order
// ---------------------------------------------------------------------------

#[test]
fn callbacks_fire_in_registration_order() {
    let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
    let log = recorder();

    for name in ["first", "second", "third"] {
        let log = Arc::clone(&log);
        dispatcher.subscribe("shift_updated", move |_| log.lock().unwrap().push(name));
    }

    let outcome = dispatcher.publish("shift_updated", &1);

    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(outcome, PublishOutcome { invoked: 3, faulted: 0 });
}

// ---------------------------------------------------------------------------
// Test: payload is passed through unchanged
// ---------------------------------------------------------------------------

#[test]
fn payload_reaches_subscriber() {
    let dispatcher: EventDispatcher<String> = EventDispatcher::new();
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = Arc::clone(&seen);
    dispatcher.subscribe("announcement", move |msg: &String| {
        *seen_clone.lock().unwrap() = Some(msg.clone());
    });

    dispatcher.publish("announcement", &"Rota published".to_string());

    assert_eq!(seen.lock().unwrap().as_deref(), Some("Rota published"));
}

// ---------------------------------------------------------------------------
// Test: events are isolated by name
// ---------------------------------------------------------------------------

#[test]
fn publish_only_reaches_matching_event() {
    let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
    let log = recorder();
    let l1 = Arc::clone(&log);
    let l2 = Arc::clone(&log);
    dispatcher.subscribe("a", move |_| l1.lock().unwrap().push("a"));
    dispatcher.subscribe("b", move |_| l2.lock().unwrap().push("b"));

    dispatcher.publish("b", &0);

    assert_eq!(*log.lock().unwrap(), vec!["b"]);
}

// ---------------------------------------------------------------------------
// Test: a removed callback does not fire
// ---------------------------------------------------------------------------

#[test]
fn unsubscribed_callback_does_not_fire() {
    let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
    let log = recorder();
    let l1 = Arc::clone(&log);
    let l2 = Arc::clone(&log);
    let removed = dispatcher.subscribe("tick", move |_| l1.lock().unwrap().push("removed"));
    dispatcher.subscribe("tick", move |_| l2.lock().unwrap().push("kept"));

    assert!(dispatcher.unsubscribe("tick", removed));
    dispatcher.publish("tick", &0);

    assert_eq!(*log.lock().unwrap(), vec!["kept"]);
}

// ---------------------------------------------------------------------------
// Test: unsubscribing an unknown handle is a no-op
// ---------------------------------------------------------------------------

#[test]
fn unsubscribe_twice_is_noop() {
    let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
    let handle = dispatcher.subscribe("tick", |_| {});

    assert!(dispatcher.unsubscribe("tick", handle));
    assert!(!dispatcher.unsubscribe("tick", handle));
    assert_eq!(dispatcher.subscriber_count("tick"), 0);
}

// ---------------------------------------------------------------------------
// Test: duplicate registrations both fire; removal removes only one
// ---------------------------------------------------------------------------

#[test]
fn duplicate_registration_fires_twice_and_removes_once() {
    let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
    let count = Arc::new(Mutex::new(0));
    let count_clone = Arc::clone(&count);
    let callback: Callback<u32> = Arc::new(move |_: &u32| *count_clone.lock().unwrap() += 1);

    let first = dispatcher.subscribe_callback("tick", Arc::clone(&callback));
    let _second = dispatcher.subscribe_callback("tick", Arc::clone(&callback));
    assert_ne!(first, _second);

    dispatcher.publish("tick", &0);
    assert_eq!(*count.lock().unwrap(), 2);

    dispatcher.unsubscribe("tick", first);
    dispatcher.publish("tick", &0);
    assert_eq!(*count.lock().unwrap(), 3);
    assert_eq!(dispatcher.subscriber_count("tick"), 1);
}

// ---------------------------------------------------------------------------
// Test: a panicking subscriber does not block later subscribers
// ---------------------------------------------------------------------------

#[test]
fn faulting_subscriber_is_contained() {
    let dispatcher: EventDispatcher<u32> = EventDispatcher::new();
    let log = recorder();
    let l1 = Arc::clone(&log);
    let l2 = Arc::clone(&log);
    dispatcher.subscribe("tick", move |_| l1.lock().unwrap().push("before"));
    dispatcher.subscribe("tick", |_| panic!("component in inconsistent state"));
    dispatcher.subscribe("tick", move |_| l2.lock().unwrap().push("after"));

    let outcome = dispatcher.publish("tick", &0);

    assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
    assert_eq!(outcome, PublishOutcome { invoked: 3, faulted: 1 });

    // The dispatcher stays usable after a fault.
    let outcome = dispatcher.publish("tick", &1);
    assert_eq!(outcome.faulted, 1);
    assert_eq!(log.lock().unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// Test: subscribing during publish does not affect the current pass
// ---------------------------------------------------------------------------

#[test]
fn subscribe_during_publish_applies_to_next_publish() {
    let dispatcher: Arc<EventDispatcher<u32>> = Arc::new(EventDispatcher::new());
    let log = recorder();

    let inner_dispatcher = Arc::clone(&dispatcher);
    let inner_log = Arc::clone(&log);
    dispatcher.subscribe("tick", move |_| {
        inner_log.lock().unwrap().push("outer");
        let late_log = Arc::clone(&inner_log);
        inner_dispatcher.subscribe("tick", move |_| late_log.lock().unwrap().push("late"));
    });

    dispatcher.publish("tick", &0);
    assert_eq!(*log.lock().unwrap(), vec!["outer"]);

    dispatcher.publish("tick", &0);
    assert_eq!(*log.lock().unwrap(), vec!["outer", "outer", "late"]);
}

// ---------------------------------------------------------------------------
// Test: unsubscribing during publish does not affect the current pass
// ---------------------------------------------------------------------------

#[test]
fn unsubscribe_during_publish_applies_to_next_publish() {
    let dispatcher: Arc<EventDispatcher<u32>> = Arc::new(EventDispatcher::new());
    let log = recorder();
    let victim = Arc::new(Mutex::new(None));

    let inner_dispatcher = Arc::clone(&dispatcher);
    let inner_victim = Arc::clone(&victim);
    dispatcher.subscribe("tick", move |_| {
        if let Some(handle) = inner_victim.lock().unwrap().take() {
            inner_dispatcher.unsubscribe("tick", handle);
        }
    });
    let victim_log = Arc::clone(&log);
    let handle = dispatcher.subscribe("tick", move |_| victim_log.lock().unwrap().push("victim"));
    *victim.lock().unwrap() = Some(handle);

    dispatcher.publish("tick", &0);
    assert_eq!(*log.lock().unwrap(), vec!["victim"]);

    dispatcher.publish("tick", &0);
    assert_eq!(*log.lock().unwrap(), vec!["victim"]);
}
