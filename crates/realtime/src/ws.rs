//! WebSocket implementation of [`Transport`].
//!
//! [`WsTransport`] holds the channel base address. Each
//! [`open`](Transport::open) performs an authenticated WebSocket handshake
//! and spawns two pump tasks: a writer that serializes outbound
//! [`ClientMessage`]s and sends keepalive pings, and a reader that forwards
//! text frames and reports exactly one [`InboundFrame::Closed`].

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::RealtimeConfig;
use crate::messages::ClientMessage;
use crate::transport::{Channel, CloseReason, InboundFrame, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens WebSocket channels to the rota server.
pub struct WsTransport {
    url: String,
    ping_interval: Option<Duration>,
}

impl WsTransport {
    /// * `url`           - base address, e.g. `wss://rota.example.com`.
    /// * `ping_interval` - keepalive period, `None` to disable.
    pub fn new(url: impl Into<String>, ping_interval: Option<Duration>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            ping_interval,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.url.clone(), config.ping_interval)
    }

    /// Base address of the channel.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Full endpoint for one connection, tagged with `client_id` so the
    /// server can correlate its logs with ours.
    pub fn endpoint(&self, client_id: &str) -> String {
        format!("{}/ws?clientId={}", self.url, client_id)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, credential: &str) -> Result<Channel, TransportError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let endpoint = self.endpoint(&client_id);

        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|_| TransportError::Handshake("credential is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, _response) = connect_async(request).await.map_err(map_connect_error)?;

        tracing::info!(client_id = %client_id, url = %self.url, "Real-time channel established");

        let (sink, stream) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(sink, outbound_rx, self.ping_interval, client_id.clone()));
        tokio::spawn(read_loop(stream, inbound_tx, client_id.clone()));

        Ok(Channel {
            client_id,
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

fn map_connect_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            TransportError::Unauthorized
        }
        WsError::Url(e) => TransportError::InvalidUrl(e.to_string()),
        other => TransportError::Handshake(other.to_string()),
    }
}

/// Forward outbound messages to the socket until the sender side is dropped,
/// then send a normal Close frame.
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    ping_interval: Option<Duration>,
    client_id: String,
) {
    let mut ping = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    loop {
        let next_ping = async {
            match ping.as_mut() {
                Some(interval) => {
                    interval.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else {
                    let close = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    let _ = sink.send(Message::Close(Some(close))).await;
                    tracing::debug!(client_id = %client_id, "Outbound side closed");
                    return;
                };
                let text = match message.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(client_id = %client_id, error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(client_id = %client_id, error = %e, "WebSocket send error");
                    return;
                }
            }
            _ = next_ping => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    tracing::debug!(client_id = %client_id, error = %e, "Keepalive ping failed");
                    return;
                }
            }
        }
    }
}

/// Forward text frames until the connection ends, then report why.
async fn read_loop(
    mut stream: SplitStream<WsStream>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    client_id: String,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if inbound.send(InboundFrame::Text(text)).is_err() {
                    // Nobody is listening any more; the channel was discarded.
                    return;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!(client_id = %client_id, "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Pongs are queued by tungstenite automatically.
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => {
                        CloseReason::from_close_code(u16::from(frame.code), frame.reason.to_string())
                    }
                    None => CloseReason::Dropped("close frame without status".into()),
                };
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => break CloseReason::Dropped(e.to_string()),
            None => break CloseReason::Dropped("stream ended without close frame".into()),
        }
    };

    tracing::info!(client_id = %client_id, ?reason, "Real-time channel closed");
    let _ = inbound.send(InboundFrame::Closed(reason));
}
