use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;

use super::{Alert, NotificationSurface, PermissionState, SurfaceError};

/// Surface that renders alerts as structured log lines.
///
/// Used by headless deployments and when no desktop notification daemon
/// is available. Permission is fixed at construction; the prompt simply
/// grants it when still undecided.
pub struct LogSurface {
    permission: AtomicU8,
}

impl LogSurface {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission: AtomicU8::new(encode(permission)),
        }
    }
}

impl Default for LogSurface {
    fn default() -> Self {
        Self::new(PermissionState::Granted)
    }
}

#[async_trait]
impl NotificationSurface for LogSurface {
    fn permission(&self) -> PermissionState {
        decode(self.permission.load(Ordering::Acquire))
    }

    async fn request_permission(&self) -> PermissionState {
        let _ = self.permission.compare_exchange(
            encode(PermissionState::Default),
            encode(PermissionState::Granted),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.permission()
    }

    fn show(&self, alert: &Alert) -> Result<(), SurfaceError> {
        tracing::info!(
            tag = %alert.tag,
            notification_id = alert.notification_id,
            sticky = alert.require_interaction,
            "{}: {}",
            alert.title,
            alert.body,
        );
        Ok(())
    }

    fn dismiss(&self, tag: &str) {
        tracing::debug!(tag, "Alert dismissed");
    }

    fn focus_app(&self) {
        tracing::debug!("Focus requested");
    }
}

fn encode(state: PermissionState) -> u8 {
    match state {
        PermissionState::Default => 0,
        PermissionState::Granted => 1,
        PermissionState::Denied => 2,
    }
}

fn decode(raw: u8) -> PermissionState {
    match raw {
        1 => PermissionState::Granted,
        2 => PermissionState::Denied,
        _ => PermissionState::Default,
    }
}
