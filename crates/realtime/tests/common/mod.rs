//! Shared fakes for the realtime integration tests.
//!
//! [`FakeTransport`] opens in-memory channels according to a script and
//! hands the server side of each one to the test. [`RecordingSurface`]
//! stands in for the platform notification facility.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rota_realtime::messages::ClientMessage;
use rota_realtime::surface::SurfaceError;
use rota_realtime::{
    Alert, Channel, CloseReason, InboundFrame, NotificationSurface, PermissionState,
    RealtimeConfig, RealtimeDispatcher, RealtimeEvent, Transport, TransportError,
};
use tokio::sync::{mpsc, oneshot};

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock and let woken tasks run.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

pub fn test_config() -> RealtimeConfig {
    RealtimeConfig {
        url: "ws://rota.test".to_string(),
        ..RealtimeConfig::default()
    }
}

/// Collect every event published under `event`.
pub fn record(dispatcher: &RealtimeDispatcher, event: &str) -> Arc<Mutex<Vec<RealtimeEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    dispatcher.subscribe(event, move |e: &RealtimeEvent| {
        seen_clone.lock().unwrap().push(e.clone())
    });
    seen
}

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

/// What the next `open()` call does.
pub enum Step {
    Accept,
    Reject(TransportError),
    /// Wait for the sender to fire (or be dropped), then accept.
    Hold(oneshot::Receiver<()>),
}

/// Server side of one in-memory channel.
pub struct ServerEnd {
    pub client_id: String,
    to_client: mpsc::UnboundedSender<InboundFrame>,
    pub from_client: mpsc::UnboundedReceiver<ClientMessage>,
}

impl ServerEnd {
    pub fn send(&self, json: &str) {
        let _ = self.to_client.send(InboundFrame::Text(json.to_string()));
    }

    /// Simulate an unexpected network loss.
    pub fn drop_connection(&self) {
        let _ = self
            .to_client
            .send(InboundFrame::Closed(CloseReason::Dropped("connection reset".into())));
    }

    /// Simulate the server ending the session on purpose.
    pub fn terminate(&self) {
        let _ = self
            .to_client
            .send(InboundFrame::Closed(CloseReason::from_close_code(1000, "logged out")));
    }
}

pub struct FakeTransport {
    script: Mutex<VecDeque<Step>>,
    opens: AtomicUsize,
    credentials: Mutex<Vec<String>>,
    servers: Mutex<VecDeque<ServerEnd>>,
}

impl FakeTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            opens: AtomicUsize::new(0),
            credentials: Mutex::new(Vec::new()),
            servers: Mutex::new(VecDeque::new()),
        })
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Number of `open()` calls made so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }

    /// Take the server end of the oldest accepted channel.
    pub fn server(&self) -> ServerEnd {
        self.servers
            .lock()
            .unwrap()
            .pop_front()
            .expect("no accepted channel")
    }

    fn accept(&self) -> Channel {
        let client_id = format!("fake-{}", self.opens());
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        self.servers.lock().unwrap().push_back(ServerEnd {
            client_id: client_id.clone(),
            to_client,
            from_client,
        });
        Channel {
            client_id,
            outbound,
            inbound,
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, credential: &str) -> Result<Channel, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.credentials.lock().unwrap().push(credential.to_string());

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Accept) => Ok(self.accept()),
            Some(Step::Reject(e)) => Err(e),
            Some(Step::Hold(gate)) => {
                let _ = gate.await;
                Ok(self.accept())
            }
            None => Err(TransportError::Handshake("server unreachable".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSurface
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SurfaceLog {
    pub permission: PermissionState,
    /// What the user answers when prompted.
    pub prompt_answer: PermissionState,
    pub prompts: usize,
    /// Alerts currently on screen, keyed by tag.
    pub visible: HashMap<String, Alert>,
    pub shown: usize,
    pub dismissed: Vec<String>,
    pub focused: usize,
}

pub struct RecordingSurface {
    pub log: Mutex<SurfaceLog>,
}

impl RecordingSurface {
    pub fn new(permission: PermissionState) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(SurfaceLog {
                permission,
                prompt_answer: PermissionState::Granted,
                ..SurfaceLog::default()
            }),
        })
    }

    pub fn answering(permission: PermissionState, answer: PermissionState) -> Arc<Self> {
        let surface = Self::new(permission);
        surface.log.lock().unwrap().prompt_answer = answer;
        surface
    }

    pub fn visible(&self) -> usize {
        self.log.lock().unwrap().visible.len()
    }

    pub fn is_visible(&self, tag: &str) -> bool {
        self.log.lock().unwrap().visible.contains_key(tag)
    }

    pub fn prompts(&self) -> usize {
        self.log.lock().unwrap().prompts
    }
}

#[async_trait]
impl NotificationSurface for RecordingSurface {
    fn permission(&self) -> PermissionState {
        self.log.lock().unwrap().permission
    }

    async fn request_permission(&self) -> PermissionState {
        self.log.lock().unwrap().prompts += 1;
        // The prompt is asynchronous on every platform.
        tokio::task::yield_now().await;
        let mut log = self.log.lock().unwrap();
        log.permission = log.prompt_answer;
        log.permission
    }

    fn show(&self, alert: &Alert) -> Result<(), SurfaceError> {
        let mut log = self.log.lock().unwrap();
        log.shown += 1;
        log.visible.insert(alert.tag.clone(), alert.clone());
        Ok(())
    }

    fn dismiss(&self, tag: &str) {
        let mut log = self.log.lock().unwrap();
        log.visible.remove(tag);
        log.dismissed.push(tag.to_string());
    }

    fn focus_app(&self) {
        self.log.lock().unwrap().focused += 1;
    }
}
