//! Channel transport seam.
//!
//! The connection manager talks to the server through a [`Transport`]
//! which opens one authenticated [`Channel`] per call. A channel is a pair
//! of in-process queues so the manager never touches sockets directly;
//! [`WsTransport`](crate::WsTransport) backs them with a WebSocket and tests
//! back them with scripted fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::ClientMessage;

/// Opens authenticated channels to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new channel authenticated with the bearer `credential`.
    ///
    /// Resolves once the server has accepted the connection.
    async fn open(&self, credential: &str) -> Result<Channel, TransportError>;
}

/// One established channel.
///
/// Dropping `outbound` asks the transport to close the connection.
#[derive(Debug)]
pub struct Channel {
    /// Correlation ID for logs (one per physical connection).
    pub client_id: String,
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// A frame delivered from the server side of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// A JSON text frame, not yet decoded.
    Text(String),
    /// The channel is closed. Always the last frame.
    Closed(CloseReason),
}

/// Why a channel closed.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// The server deliberately terminated the session (close code 1000 or
    /// 1008). Never retried automatically.
    ServerTerminated { code: u16, reason: String },
    /// The connection was lost unexpectedly. Eligible for reconnection.
    Dropped(String),
}

impl CloseReason {
    /// Close codes the server uses to end a session on purpose.
    pub const DELIBERATE_CODES: [u16; 2] = [1000, 1008];

    /// Classify a close frame received from the server.
    pub fn from_close_code(code: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if Self::DELIBERATE_CODES.contains(&code) {
            CloseReason::ServerTerminated { code, reason }
        } else {
            CloseReason::Dropped(format!("close code {code}: {reason}"))
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CloseReason::Dropped(_))
    }
}

/// Errors raised while opening a channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The server rejected the bearer credential.
    #[error("Credential rejected by server")]
    Unauthorized,

    /// The attempt did not complete within the connect timeout.
    #[error("Connection attempt timed out")]
    Timeout,

    /// The handshake failed (network, DNS, TLS, protocol).
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),
}
