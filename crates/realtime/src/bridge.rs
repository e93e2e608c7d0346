//! Native notification bridge.
//!
//! [`NativeBridge`] turns `new_notification` events into platform alerts.
//! Permission is negotiated at most once per session; alerts are keyed by
//! notification id so a re-delivery replaces the visible alert; non-urgent
//! alerts are dismissed after [`BridgeConfig::auto_dismiss`]; and a click on
//! an alert carrying an action reference is republished as a
//! `notification_click` event for the application to navigate. The bridge
//! never navigates itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rota_core::types::DbId;
use rota_core::NotificationRecord;
use rota_events::SubscriptionHandle;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::events::{RealtimeDispatcher, RealtimeEvent};
use crate::messages::NEW_NOTIFICATION;
use crate::surface::{Alert, AlertAction, AlertActivity, NotificationSurface, PermissionState};

/// Tag under which the alert for notification `id` is shown.
pub fn alert_tag(id: DbId) -> String {
    format!("notification-{id}")
}

/// Bookkeeping for one alert currently on screen.
struct ActiveAlert {
    /// Distinguishes re-deliveries of the same notification id so a stale
    /// auto-dismiss timer cannot remove its replacement.
    seq: u64,
    tag: String,
    action_url: Option<String>,
    /// Cancels the auto-dismiss timer. `None` for urgent alerts.
    dismiss_timer: Option<CancellationToken>,
}

type ActiveAlerts = Arc<Mutex<HashMap<DbId, ActiveAlert>>>;

/// Bridges real-time notifications to a [`NotificationSurface`].
pub struct NativeBridge {
    surface: Arc<dyn NotificationSurface>,
    dispatcher: Arc<RealtimeDispatcher>,
    config: BridgeConfig,
    /// Result of the one permission prompt allowed per session.
    negotiated: OnceCell<PermissionState>,
    active: ActiveAlerts,
    next_seq: AtomicU64,
}

impl NativeBridge {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        dispatcher: Arc<RealtimeDispatcher>,
        config: BridgeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            surface,
            dispatcher,
            config,
            negotiated: OnceCell::new(),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Subscribe the bridge to `new_notification` on its dispatcher.
    ///
    /// The subscription holds only a weak reference, so dropping the last
    /// `Arc<NativeBridge>` turns it into a no-op.
    pub fn attach(self: &Arc<Self>) -> SubscriptionHandle {
        let bridge = Arc::downgrade(self);
        self.dispatcher
            .subscribe(NEW_NOTIFICATION, move |event: &RealtimeEvent| {
                let RealtimeEvent::NewNotification(data) = event else {
                    return;
                };
                if let Some(bridge) = bridge.upgrade() {
                    bridge.present(&data.notification);
                }
            })
    }

    /// Negotiate alert permission.
    ///
    /// Returns the current state without prompting when it is already
    /// granted or denied. While undecided, the platform prompt runs at most
    /// once per bridge; concurrent callers share its result.
    pub async fn request_permission(&self) -> PermissionState {
        let current = self.surface.permission();
        if current != PermissionState::Default {
            return current;
        }

        *self
            .negotiated
            .get_or_init(|| async {
                let state = self.surface.request_permission().await;
                tracing::info!(permission = ?state, "Notification permission negotiated");
                state
            })
            .await
    }

    /// Show an alert for `record` if permission is granted.
    ///
    /// Returns whether an alert was rendered. Without permission this is a
    /// silent no-op: nothing is queued for later.
    pub fn present(&self, record: &NotificationRecord) -> bool {
        if self.surface.permission() != PermissionState::Granted {
            tracing::debug!(notification_id = record.id, "Alert suppressed, permission not granted");
            return false;
        }

        let tag = alert_tag(record.id);
        let alert = Alert {
            tag: tag.clone(),
            notification_id: record.id,
            title: record.title.clone(),
            body: record.message.clone(),
            require_interaction: record.is_urgent(),
        };
        if let Err(e) = self.surface.show(&alert) {
            tracing::warn!(notification_id = record.id, error = %e, "Failed to show alert");
            return false;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let dismiss_timer = if record.is_urgent() {
            None
        } else {
            self.schedule_dismiss(record.id, seq)
        };

        let previous = lock(&self.active).insert(
            record.id,
            ActiveAlert {
                seq,
                tag,
                action_url: record.action_url.clone(),
                dismiss_timer,
            },
        );
        if let Some(timer) = previous.and_then(|p| p.dismiss_timer) {
            timer.cancel();
        }

        tracing::debug!(
            notification_id = record.id,
            priority = %record.priority,
            "Alert presented",
        );
        true
    }

    /// React to the user activating the alert for `notification_id`.
    ///
    /// Brings the application forward, dismisses the alert and, when the
    /// notification carries an action reference, publishes
    /// `notification_click`.
    pub fn handle_click(&self, notification_id: DbId) {
        self.surface.focus_app();

        let Some(entry) = lock(&self.active).remove(&notification_id) else {
            tracing::debug!(notification_id, "Click on alert that is no longer tracked");
            return;
        };
        if let Some(timer) = entry.dismiss_timer {
            timer.cancel();
        }
        self.surface.dismiss(&entry.tag);
        tracing::debug!(notification_id, "Alert clicked");

        if let Some(action_url) = entry.action_url {
            RealtimeEvent::NotificationClick {
                notification_id,
                action_url,
            }
            .publish_on(&self.dispatcher);
        }
    }

    /// The user closed the alert for `notification_id` without clicking.
    pub fn handle_closed(&self, notification_id: DbId) {
        if let Some(entry) = lock(&self.active).remove(&notification_id) {
            if let Some(timer) = entry.dismiss_timer {
                timer.cancel();
            }
            tracing::debug!(notification_id, "Alert closed by user");
        }
    }

    /// Route one piece of user activity reported by the surface.
    pub fn handle_activity(&self, activity: AlertActivity) {
        match activity.action {
            AlertAction::Clicked => self.handle_click(activity.notification_id),
            AlertAction::Closed => self.handle_closed(activity.notification_id),
        }
    }

    /// Consume `activity` from a surface until the sender side is dropped.
    ///
    /// Like [`attach`](Self::attach), the task holds only a weak reference
    /// and stops once the bridge is gone.
    pub fn listen(
        self: &Arc<Self>,
        mut activity: mpsc::UnboundedReceiver<AlertActivity>,
    ) -> JoinHandle<()> {
        let bridge = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(next) = activity.recv().await {
                let Some(bridge) = bridge.upgrade() else {
                    break;
                };
                bridge.handle_activity(next);
            }
            tracing::debug!("Alert activity stream ended");
        })
    }

    /// Number of alerts currently tracked as visible.
    pub fn active_alerts(&self) -> usize {
        lock(&self.active).len()
    }

    fn schedule_dismiss(&self, notification_id: DbId, seq: u64) -> Option<CancellationToken> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(notification_id, "No runtime available, alert will not auto-dismiss");
            return None;
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let surface = Arc::clone(&self.surface);
        let active = Arc::clone(&self.active);
        // Measured from presentation, not from when the task first runs.
        let deadline = tokio::time::Instant::now() + self.config.auto_dismiss;

        runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let expired = {
                        let mut active = lock(&active);
                        match active.get(&notification_id) {
                            Some(entry) if entry.seq == seq => active.remove(&notification_id),
                            _ => None,
                        }
                    };
                    if let Some(entry) = expired {
                        surface.dismiss(&entry.tag);
                        tracing::debug!(notification_id, "Alert auto-dismissed");
                    }
                }
            }
        });

        Some(token)
    }
}

fn lock(active: &Mutex<HashMap<DbId, ActiveAlert>>) -> MutexGuard<'_, HashMap<DbId, ActiveAlert>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}
