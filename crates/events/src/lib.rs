//! In-process event dispatch for the rota client.
//!
//! [`EventDispatcher`] maps event names to ordered subscriber callbacks.
//! It decouples message arrival on the real-time channel from the
//! application code that reacts to it, and contains subscriber panics at
//! the dispatch boundary so one faulty callback cannot starve the others.

pub mod dispatcher;

pub use dispatcher::{Callback, EventDispatcher, PublishOutcome, SubscriberFault, SubscriptionHandle};
