//! Events published through the dispatcher.
//!
//! Inbound server messages are republished under their wire names; the
//! client adds its own lifecycle events (`connection_status`,
//! `reconnect_exhausted`) and the bridge adds `notification_click`.

use std::fmt;

use rota_core::types::DbId;
use rota_events::EventDispatcher;
use serde::Serialize;

use crate::messages::{
    ConnectedInfo, NewNotification, ReadSync, ServerMessage, SystemAnnouncement, CONNECTED,
    NEW_NOTIFICATION, NOTIFICATION_READ_SYNC, SYSTEM_ANNOUNCEMENT,
};

/// The user activated a native alert that carries an action reference.
pub const NOTIFICATION_CLICK: &str = "notification_click";
/// The channel moved to a new [`ChannelState`].
pub const CONNECTION_STATUS: &str = "connection_status";
/// Automatic reconnection gave up.
pub const RECONNECT_EXHAUSTED: &str = "reconnect_exhausted";

/// Dispatcher specialised to real-time events.
pub type RealtimeDispatcher = EventDispatcher<RealtimeEvent>;

/// Lifecycle state of the single logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        })
    }
}

/// Payload carried by every real-time dispatcher event.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    NewNotification(NewNotification),
    NotificationReadSync(ReadSync),
    SystemAnnouncement(SystemAnnouncement),
    Connected(ConnectedInfo),
    /// Click-through request raised by the native bridge.
    NotificationClick {
        notification_id: DbId,
        action_url: String,
    },
    StatusChanged(ChannelState),
    ReconnectExhausted {
        attempts: u32,
    },
}

impl RealtimeEvent {
    /// Event name this payload is published under.
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::NewNotification(_) => NEW_NOTIFICATION,
            RealtimeEvent::NotificationReadSync(_) => NOTIFICATION_READ_SYNC,
            RealtimeEvent::SystemAnnouncement(_) => SYSTEM_ANNOUNCEMENT,
            RealtimeEvent::Connected(_) => CONNECTED,
            RealtimeEvent::NotificationClick { .. } => NOTIFICATION_CLICK,
            RealtimeEvent::StatusChanged(_) => CONNECTION_STATUS,
            RealtimeEvent::ReconnectExhausted { .. } => RECONNECT_EXHAUSTED,
        }
    }

    /// Publish `self` on `dispatcher` under [`name`](Self::name).
    pub fn publish_on(&self, dispatcher: &RealtimeDispatcher) {
        dispatcher.publish(self.name(), self);
    }
}

impl From<ServerMessage> for RealtimeEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::NewNotification(data) => RealtimeEvent::NewNotification(data),
            ServerMessage::NotificationReadSync(data) => RealtimeEvent::NotificationReadSync(data),
            ServerMessage::SystemAnnouncement(data) => RealtimeEvent::SystemAnnouncement(data),
            ServerMessage::Connected(info) => RealtimeEvent::Connected(info),
        }
    }
}
