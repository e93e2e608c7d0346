//! Shared types for the rota workforce-scheduling client.
//!
//! Holds the primitive aliases used across crates and the
//! [`NotificationRecord`] data model delivered by the real-time channel.

pub mod error;
pub mod notification;
pub mod types;

pub use error::CoreError;
pub use notification::{NotificationRecord, Priority};
