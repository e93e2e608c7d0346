use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors surfaced by [`RealtimeClient`](crate::RealtimeClient).
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// A connect was requested while another attempt is still outstanding.
    #[error("A connection attempt is already in progress")]
    ConnectionInProgress,

    /// The channel failed to establish or authenticate.
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    /// Automatic reconnection gave up. Call `connect` again to resume.
    #[error("Reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// The attempt was superseded by an explicit `disconnect()`.
    #[error("Connection attempt cancelled by disconnect")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
