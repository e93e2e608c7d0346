//! Real-time connection manager.
//!
//! [`RealtimeClient`] owns the lifecycle of one logical channel: connect
//! with a bearer credential, pump inbound frames into the dispatcher,
//! detect closure, and reconnect with exponential backoff after unexpected
//! drops. Deliberate server terminations and explicit
//! [`disconnect`](RealtimeClient::disconnect) calls are never retried.
//!
//! All connection state lives behind one mutex and is only touched by this
//! module. Every `connect()` and `disconnect()` bumps a generation counter
//! and replaces the cancellation token; tasks spawned for an older
//! generation notice the mismatch and discard their results, so a stale
//! connect or reconnect can never resurrect the `connected` state.
//!
//! Status events are numbered under the state lock and a superseded one is
//! dropped rather than delivered late, so `connection_status` subscribers
//! never see the status go backwards. They may miss an intermediate state;
//! [`RealtimeClient::connection_status`] is always current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rota_core::types::DbId;
use rota_events::SubscriptionHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::events::{ChannelState, RealtimeDispatcher, RealtimeEvent};
use crate::messages::ClientMessage;
use crate::processor::process_frames;
use crate::reconnect::ReconnectState;
use crate::transport::{Channel, CloseReason, InboundFrame, Transport, TransportError};
use crate::ws::WsTransport;

/// Client handle for the real-time channel.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: RealtimeConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<RealtimeDispatcher>,
    state: Mutex<ConnState>,
    /// Sequence number of the newest status event handed to subscribers.
    last_published: AtomicU64,
}

struct ConnState {
    /// Bumped by `connect()` and `disconnect()`.
    generation: u64,
    /// Cancels the reader and reconnect loop of the current generation.
    cancel: CancellationToken,
    /// A connect or reconnect attempt is in flight.
    connecting: bool,
    session: Option<Session>,
    reconnect: ReconnectState,
    /// Credential of the last explicit `connect()`, reused for reconnects.
    credential: Option<String>,
    /// Last status published on `connection_status`.
    published: ChannelState,
    /// Numbers status transitions in the order they happened.
    status_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct StatusChange {
    seq: u64,
    status: ChannelState,
}

impl ConnState {
    fn status(&self) -> ChannelState {
        if self.connecting {
            ChannelState::Connecting
        } else if self.session.is_some() {
            ChannelState::Connected
        } else {
            ChannelState::Disconnected
        }
    }

    /// Start a new generation and return its cancellation token.
    fn begin_generation(&mut self) -> CancellationToken {
        self.generation += 1;
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.cancel.clone()
    }

    /// Record the current status and return it if it changed.
    fn transition(&mut self) -> Option<StatusChange> {
        let status = self.status();
        if status == self.published {
            return None;
        }
        self.published = status;
        self.status_seq += 1;
        Some(StatusChange {
            seq: self.status_seq,
            status,
        })
    }
}

/// The established half of a channel that the manager keeps.
///
/// Dropping it drops the outbound sender, which closes the connection.
struct Session {
    client_id: String,
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl RealtimeClient {
    /// Create a disconnected client.
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<RealtimeDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                dispatcher,
                state: Mutex::new(ConnState {
                    generation: 0,
                    cancel: CancellationToken::new(),
                    connecting: false,
                    session: None,
                    reconnect: ReconnectState::new(),
                    credential: None,
                    published: ChannelState::Disconnected,
                    status_seq: 0,
                }),
                last_published: AtomicU64::new(0),
            }),
        }
    }

    /// Create a client that connects over WebSocket to `config.url`.
    pub fn websocket(config: RealtimeConfig, dispatcher: Arc<RealtimeDispatcher>) -> Self {
        let transport = Arc::new(WsTransport::from_config(&config));
        Self::new(config, transport, dispatcher)
    }

    /// WebSocket client configured from the environment
    /// (see [`RealtimeConfig::from_env`]).
    pub fn from_env(dispatcher: Arc<RealtimeDispatcher>) -> Result<Self, RealtimeError> {
        let config = RealtimeConfig::from_env()?;
        Ok(Self::websocket(config, dispatcher))
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// The dispatcher inbound events are published on.
    pub fn dispatcher(&self) -> &Arc<RealtimeDispatcher> {
        &self.inner.dispatcher
    }

    /// Register `callback` for `event` (see [`crate::messages`] and
    /// [`crate::events`] for the event names).
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(event, callback)
    }

    pub fn unsubscribe(&self, event: &str, handle: SubscriptionHandle) -> bool {
        self.inner.dispatcher.unsubscribe(event, handle)
    }

    /// Current channel status. Has no side effects.
    ///
    /// Authoritative even when `connection_status` events were skipped.
    pub fn connection_status(&self) -> ChannelState {
        self.inner.lock().status()
    }

    /// Reconnect attempts made since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect.attempt()
    }

    /// Open the channel authenticated with `credential`.
    ///
    /// Returns immediately when already connected. Fails with
    /// [`RealtimeError::ConnectionInProgress`] while another attempt is
    /// outstanding. A failure here is not retried automatically; automatic
    /// reconnection only follows a drop of an established channel.
    pub async fn connect(&self, credential: &str) -> Result<(), RealtimeError> {
        let (generation, cancel, changed) = {
            let mut state = self.inner.lock();
            if state.connecting {
                return Err(RealtimeError::ConnectionInProgress);
            }
            if state.session.is_some() {
                return Ok(());
            }
            // Supersedes any reconnect loop still waiting out its backoff.
            let cancel = state.begin_generation();
            state.connecting = true;
            state.credential = Some(credential.to_string());
            (state.generation, cancel, state.transition())
        };
        self.inner.publish_status(changed);

        tracing::info!(url = %self.inner.config.url, "Connecting to real-time channel");

        let pending = PendingConnect {
            inner: &self.inner,
            generation,
            armed: true,
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RealtimeError::Cancelled),
            result = self.inner.open(credential) => result,
        };
        // No await below, so the caller can no longer abandon the attempt.
        pending.disarm();

        match result {
            Ok(channel) => {
                if Inner::install(&self.inner, generation, channel, &cancel) {
                    Ok(())
                } else {
                    Err(RealtimeError::Cancelled)
                }
            }
            Err(e) => {
                let (current, changed) = {
                    let mut state = self.inner.lock();
                    if state.generation == generation {
                        state.connecting = false;
                        (true, state.transition())
                    } else {
                        (false, None)
                    }
                };
                self.inner.publish_status(changed);
                if !current {
                    return Err(RealtimeError::Cancelled);
                }
                tracing::warn!(error = %e, "Failed to connect to real-time channel");
                Err(RealtimeError::Connection(e))
            }
        }
    }

    /// Tear down the channel and cancel any pending reconnect.
    ///
    /// Always succeeds, including when already disconnected. Attempts still
    /// in flight complete into the void.
    pub fn disconnect(&self) {
        let (session, changed) = {
            let mut state = self.inner.lock();
            state.begin_generation();
            state.connecting = false;
            state.reconnect.reset();
            let session = state.session.take();
            (session, state.transition())
        };

        if let Some(session) = session {
            tracing::info!(client_id = %session.client_id, "Disconnecting from real-time channel");
        }
        self.inner.publish_status(changed);
    }

    /// Send a read-receipt for `notification_id` if connected.
    ///
    /// Best effort: when offline the receipt is dropped without error.
    pub fn acknowledge_read(&self, notification_id: DbId) {
        let state = self.inner.lock();
        let Some(session) = state.session.as_ref() else {
            tracing::debug!(notification_id, "Not connected, read receipt dropped");
            return;
        };
        if session
            .outbound
            .send(ClientMessage::NotificationRead { notification_id })
            .is_err()
        {
            tracing::debug!(
                client_id = %session.client_id,
                notification_id,
                "Channel closing, read receipt dropped",
            );
        } else {
            tracing::trace!(client_id = %session.client_id, notification_id, "Read receipt sent");
        }
    }
}

impl Inner {
    // Subscriber panics are caught by the dispatcher and callbacks never run
    // under this lock, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_status(&self, changed: Option<StatusChange>) {
        let Some(StatusChange { seq, status }) = changed else {
            return;
        };
        if self.last_published.fetch_max(seq, Ordering::SeqCst) > seq {
            tracing::debug!(%status, seq, "Skipping superseded status event");
            return;
        }
        tracing::debug!(%status, "Channel status changed");
        RealtimeEvent::StatusChanged(status).publish_on(&self.dispatcher);
    }

    /// One transport attempt bounded by the connect timeout.
    async fn open(&self, credential: &str) -> Result<Channel, TransportError> {
        match tokio::time::timeout(self.config.connect_timeout, self.transport.open(credential))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Adopt a freshly opened channel if `generation` is still current and
    /// start pumping its frames. Returns `false` when the channel was
    /// discarded as stale.
    fn install(
        this: &Arc<Self>,
        generation: u64,
        channel: Channel,
        cancel: &CancellationToken,
    ) -> bool {
        let Channel {
            client_id,
            outbound,
            inbound,
        } = channel;

        let changed = {
            let mut state = this.lock();
            if state.generation != generation {
                drop(state);
                tracing::debug!(client_id = %client_id, "Discarding connection superseded by disconnect");
                return false;
            }
            state.connecting = false;
            state.reconnect.reset();
            state.session = Some(Session {
                client_id: client_id.clone(),
                outbound,
            });
            state.transition()
        };

        tracing::info!(client_id = %client_id, "Connected to real-time channel");
        this.publish_status(changed);

        let inner = Arc::clone(this);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            inner.run_session(generation, client_id, inbound, cancel).await;
        });
        true
    }

    /// Pump one channel until it closes, then decide whether to reconnect.
    async fn run_session(
        self: Arc<Self>,
        generation: u64,
        client_id: String,
        mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
        cancel: CancellationToken,
    ) {
        let Some(reason) = process_frames(&mut inbound, &client_id, &self.dispatcher, &cancel).await
        else {
            tracing::debug!(client_id = %client_id, "Session reader cancelled");
            return;
        };

        let changed = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.session = None;
            state.transition()
        };
        self.publish_status(changed);

        match reason {
            CloseReason::ServerTerminated { code, reason } => {
                tracing::info!(
                    client_id = %client_id,
                    code,
                    reason = %reason,
                    "Server terminated the session, not reconnecting",
                );
            }
            CloseReason::Dropped(cause) => {
                tracing::warn!(client_id = %client_id, cause = %cause, "Real-time channel dropped");
                self.reconnect_loop(generation, &cancel).await;
            }
        }
    }

    /// Retry with exponential backoff until connected, cancelled, or out of
    /// attempts.
    async fn reconnect_loop(self: &Arc<Self>, generation: u64, cancel: &CancellationToken) {
        let config = &self.config.reconnect;

        loop {
            let scheduled = {
                let mut state = self.lock();
                if state.generation != generation {
                    return;
                }
                let next = state.reconnect.schedule(config);
                let attempt = state.reconnect.attempt();
                next.map(|delay| (delay, attempt))
            };

            let Some((delay, attempt)) = scheduled else {
                let attempts = config.max_attempts;
                tracing::error!(attempts, "Reconnect attempts exhausted, giving up");
                RealtimeEvent::ReconnectExhausted { attempts }.publish_on(&self.dispatcher);
                return;
            };

            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect",
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "Reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let (credential, changed) = {
                let mut state = self.lock();
                if state.generation != generation || state.connecting || state.session.is_some() {
                    return;
                }
                let Some(credential) = state.credential.clone() else {
                    return;
                };
                state.connecting = true;
                (credential, state.transition())
            };
            self.publish_status(changed);

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "Reconnect attempt cancelled");
                    return;
                }
                result = self.open(&credential) => result,
            };

            match result {
                Ok(channel) => {
                    if Inner::install(self, generation, channel, cancel) {
                        tracing::info!(attempt, "Reconnected to real-time channel");
                    }
                    return;
                }
                Err(e) => {
                    let changed = {
                        let mut state = self.lock();
                        if state.generation != generation {
                            return;
                        }
                        state.connecting = false;
                        state.transition()
                    };
                    self.publish_status(changed);
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }
    }
}

/// Clears `connecting` when a `connect()` future is dropped before the
/// transport answered, unless a newer generation has taken over.
struct PendingConnect<'a> {
    inner: &'a Arc<Inner>,
    generation: u64,
    armed: bool,
}

impl PendingConnect<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let changed = {
            let mut state = self.inner.lock();
            if state.generation != self.generation || !state.connecting {
                return;
            }
            state.connecting = false;
            state.transition()
        };
        tracing::debug!("Connect attempt abandoned by caller");
        self.inner.publish_status(changed);
    }
}
