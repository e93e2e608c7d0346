//! Real-time notification delivery client.
//!
//! Maintains one authenticated WebSocket channel to the rota server,
//! recovers from unexpected drops with bounded exponential backoff,
//! fans inbound events out through an [`EventDispatcher`], and bridges new
//! notifications to a platform alert surface.
//!
//! [`EventDispatcher`]: rota_events::EventDispatcher

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod surface;
pub mod transport;
pub mod ws;

pub use bridge::NativeBridge;
pub use config::{BridgeConfig, RealtimeConfig, ReconnectConfig};
pub use error::RealtimeError;
pub use events::{ChannelState, RealtimeDispatcher, RealtimeEvent};
pub use manager::RealtimeClient;
pub use surface::{
    Alert, AlertAction, AlertActivity, LogSurface, NotificationSurface, PermissionState,
};
pub use transport::{Channel, CloseReason, InboundFrame, Transport, TransportError};
pub use ws::WsTransport;
