//! Platform notification surfaces.
//!
//! The native bridge treats the operating system's notification facility
//! as a capability behind [`NotificationSurface`]: it can report and
//! negotiate permission, show an alert keyed by tag, dismiss it, and bring
//! the application to the foreground.

#[cfg(all(feature = "desktop", target_os = "linux"))]
mod desktop;
mod logging;

#[cfg(all(feature = "desktop", target_os = "linux"))]
pub use desktop::DesktopSurface;
pub use logging::LogSurface;

use async_trait::async_trait;
use rota_core::types::DbId;
use serde::{Deserialize, Serialize};

/// Platform permission to show alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user has not decided yet; a prompt may be shown.
    #[default]
    Default,
    Granted,
    Denied,
}

/// A platform alert ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Replacement key: showing an alert with a tag already on screen
    /// replaces the earlier one.
    pub tag: String,
    pub notification_id: DbId,
    pub title: String,
    pub body: String,
    /// Stay on screen until the user interacts with it.
    pub require_interaction: bool,
}

/// What the user did with a rendered alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    /// The alert body was activated.
    Clicked,
    /// The alert was closed without being activated.
    Closed,
}

/// User activity on the alert of one notification, reported by surfaces
/// that can observe it. Feed these into
/// [`NativeBridge::listen`](crate::NativeBridge::listen).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertActivity {
    pub notification_id: DbId,
    pub action: AlertAction,
}

/// Operating-system notification capability.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Current permission, without prompting.
    fn permission(&self) -> PermissionState;

    /// Prompt the user and resolve with their decision.
    async fn request_permission(&self) -> PermissionState;

    /// Render `alert`, replacing any visible alert with the same tag.
    fn show(&self, alert: &Alert) -> Result<(), SurfaceError>;

    /// Remove the alert with `tag`, if it is still visible.
    fn dismiss(&self, tag: &str);

    /// Bring the application window to the foreground.
    fn focus_app(&self);
}

/// Errors raised by a notification surface.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Notification surface unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to show alert: {0}")]
    Show(String),
}
