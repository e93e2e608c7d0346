use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use notify_rust::{Notification, Timeout};
use tokio::sync::mpsc;

use super::{
    Alert, AlertAction, AlertActivity, NotificationSurface, PermissionState, SurfaceError,
};

/// Action key the daemon reports when the alert body is clicked.
const DEFAULT_ACTION: &str = "default";
/// Pseudo-action notify-rust reports when the alert is closed.
const CLOSED_ACTION: &str = "__closed";

/// Daemon-side state of one tag.
enum Slot {
    /// `show` was called but the daemon has not answered yet.
    Pending { dismissed: bool },
    /// On screen under the daemon-assigned id.
    Shown(u32),
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Surface backed by the freedesktop notification daemon.
///
/// The daemon does not gate notifications behind a permission prompt, so
/// permission is always granted. Alerts are replaced by re-using the
/// daemon-assigned id of the previous alert with the same tag.
///
/// D-Bus calls are blocking, so every alert is shown from its own thread,
/// which then stays parked until the user clicks or closes the alert and
/// reports that as an [`AlertActivity`].
pub struct DesktopSurface {
    appname: String,
    visible: Slots,
    activity: mpsc::UnboundedSender<AlertActivity>,
}

impl DesktopSurface {
    /// Returns the surface and the stream of user activity on its alerts.
    pub fn new(appname: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<AlertActivity>) {
        let (activity, activity_rx) = mpsc::unbounded_channel();
        let surface = Self {
            appname: appname.into(),
            visible: Arc::new(Mutex::new(HashMap::new())),
            activity,
        };
        (surface, activity_rx)
    }
}

#[async_trait]
impl NotificationSurface for DesktopSurface {
    fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn show(&self, alert: &Alert) -> Result<(), SurfaceError> {
        let previous = {
            let mut visible = lock(&self.visible);
            let previous = match visible.get(&alert.tag) {
                Some(Slot::Shown(id)) => Some(*id),
                _ => None,
            };
            visible.insert(alert.tag.clone(), Slot::Pending { dismissed: false });
            previous
        };

        let appname = self.appname.clone();
        let owned = alert.clone();
        let visible = Arc::clone(&self.visible);
        let activity = self.activity.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("alert-{}", alert.notification_id))
            .spawn(move || show_and_wait(&appname, owned, previous, &visible, &activity));
        if let Err(e) = spawned {
            lock(&self.visible).remove(&alert.tag);
            return Err(SurfaceError::Unavailable(e.to_string()));
        }
        Ok(())
    }

    fn dismiss(&self, tag: &str) {
        let id = {
            let mut visible = lock(&self.visible);
            match visible.get_mut(tag) {
                Some(Slot::Pending { dismissed }) => {
                    // Closed by the showing thread once the daemon answers.
                    *dismissed = true;
                    None
                }
                Some(Slot::Shown(id)) => {
                    let id = *id;
                    visible.remove(tag);
                    Some(id)
                }
                None => None,
            }
        };
        let Some(id) = id else {
            return;
        };

        let appname = self.appname.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("alert-close-{id}"))
            .spawn(move || close_by_id(&appname, id));
        if let Err(e) = spawned {
            tracing::warn!(id, error = %e, "Failed to close desktop alert");
        }
    }

    fn focus_app(&self) {
        // The freedesktop protocol has no way to raise the caller's window.
        tracing::debug!(appname = %self.appname, "Focus requested");
    }
}

fn show_and_wait(
    appname: &str,
    alert: Alert,
    previous: Option<u32>,
    visible: &Slots,
    activity: &mpsc::UnboundedSender<AlertActivity>,
) {
    let mut notification = Notification::new();
    notification
        .appname(appname)
        .summary(&alert.title)
        .body(&alert.body)
        .action(DEFAULT_ACTION, "Open");
    if alert.require_interaction {
        notification.timeout(Timeout::Never);
    }
    if let Some(id) = previous {
        notification.id(id);
    }

    let handle = match notification.show() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(
                notification_id = alert.notification_id,
                error = %e,
                "Failed to show desktop alert",
            );
            lock(visible).remove(&alert.tag);
            return;
        }
    };

    let id = handle.id();
    let dismissed_early = {
        let mut visible = lock(visible);
        if matches!(visible.get(&alert.tag), Some(Slot::Pending { dismissed: true })) {
            visible.remove(&alert.tag);
            true
        } else {
            visible.insert(alert.tag.clone(), Slot::Shown(id));
            false
        }
    };
    if dismissed_early {
        handle.close();
        return;
    }

    handle.wait_for_action(|action| {
        let action = match action {
            DEFAULT_ACTION => AlertAction::Clicked,
            CLOSED_ACTION => AlertAction::Closed,
            other => {
                tracing::debug!(action = other, "Ignoring alert action");
                return;
            }
        };

        let mut visible = lock(visible);
        if matches!(visible.get(&alert.tag), Some(Slot::Shown(shown)) if *shown == id) {
            visible.remove(&alert.tag);
        }
        drop(visible);

        let _ = activity.send(AlertActivity {
            notification_id: alert.notification_id,
            action,
        });
    });
}

/// The daemon only closes alerts through a handle, so re-acquire one by
/// replacing the alert in place.
fn close_by_id(appname: &str, id: u32) {
    match Notification::new().appname(appname).id(id).show() {
        Ok(handle) => handle.close(),
        Err(e) => tracing::debug!(id, error = %e, "Desktop alert already gone"),
    }
}

fn lock(slots: &Mutex<HashMap<String, Slot>>) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
