//! Wire message types and codec.
//!
//! Every frame on the channel is a JSON object with the shape
//! `{"type": "<event name>", "data": {...}}`. Inbound frames are decoded in
//! two steps (envelope first, then the payload for a known name) so that
//! event names added on the server side can be skipped without failing.

use rota_core::types::{DbId, Timestamp};
use rota_core::NotificationRecord;
use serde::{Deserialize, Serialize};

/// A notification was created for the current user.
pub const NEW_NOTIFICATION: &str = "new_notification";
/// A notification was marked read in another session.
pub const NOTIFICATION_READ_SYNC: &str = "notification_read_sync";
/// Broadcast announcement from administrators.
pub const SYSTEM_ANNOUNCEMENT: &str = "system_announcement";
/// The server confirmed the session.
pub const CONNECTED: &str = "connected";
/// Outbound read-receipt.
pub const NOTIFICATION_READ: &str = "notification_read";

/// Payload of [`NEW_NOTIFICATION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub notification: NotificationRecord,
    /// When the server pushed the notification.
    pub timestamp: Timestamp,
}

/// Payload of [`NOTIFICATION_READ_SYNC`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadSync {
    pub notification_id: DbId,
    pub read_at: Timestamp,
}

/// Payload of [`SYSTEM_ANNOUNCEMENT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAnnouncement {
    /// Free-form announcement body.
    pub announcement: serde_json::Value,
    pub timestamp: Timestamp,
}

/// Payload of [`CONNECTED`]. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectedInfo {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<DbId>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// All inbound message types the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    NewNotification(NewNotification),
    NotificationReadSync(ReadSync),
    SystemAnnouncement(SystemAnnouncement),
    Connected(ConnectedInfo),
}

impl ServerMessage {
    /// The event name this message arrived under.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::NewNotification(_) => NEW_NOTIFICATION,
            ServerMessage::NotificationReadSync(_) => NOTIFICATION_READ_SYNC,
            ServerMessage::SystemAnnouncement(_) => SYSTEM_ANNOUNCEMENT,
            ServerMessage::Connected(_) => CONNECTED,
        }
    }
}

/// Messages the client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Best-effort read-receipt for one notification.
    NotificationRead { notification_id: DbId },
}

impl ClientMessage {
    /// Serialize to the JSON text frame sent over the channel.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Why an inbound frame could not be turned into a [`ServerMessage`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a `{"type", "data"}` JSON object.
    #[error("Malformed frame: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The event name is not one this client knows. Safe to skip.
    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    /// A known event carried a payload that does not match its schema.
    #[error("Invalid payload for '{event}': {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a text frame into a typed message.
pub fn parse_message(text: &str) -> Result<ServerMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Envelope)?;

    let payload_error = |source| DecodeError::Payload {
        event: envelope.kind.clone(),
        source,
    };

    let message = match envelope.kind.as_str() {
        NEW_NOTIFICATION => ServerMessage::NewNotification(
            serde_json::from_value(envelope.data).map_err(payload_error)?,
        ),
        NOTIFICATION_READ_SYNC => ServerMessage::NotificationReadSync(
            serde_json::from_value(envelope.data).map_err(payload_error)?,
        ),
        SYSTEM_ANNOUNCEMENT => ServerMessage::SystemAnnouncement(
            serde_json::from_value(envelope.data).map_err(payload_error)?,
        ),
        CONNECTED => {
            let info = if envelope.data.is_null() {
                ConnectedInfo::default()
            } else {
                serde_json::from_value(envelope.data).map_err(payload_error)?
            };
            ServerMessage::Connected(info)
        }
        other => return Err(DecodeError::UnknownEvent(other.to_string())),
    };

    Ok(message)
}
