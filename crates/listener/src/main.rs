use std::sync::Arc;

use anyhow::Context;
use rota_realtime::config::ConfigError;
use rota_realtime::events::{CONNECTION_STATUS, NOTIFICATION_CLICK, RECONNECT_EXHAUSTED};
use rota_realtime::messages::{CONNECTED, NEW_NOTIFICATION, NOTIFICATION_READ_SYNC, SYSTEM_ANNOUNCEMENT};
use rota_realtime::{
    AlertActivity, BridgeConfig, NativeBridge, NotificationSurface, RealtimeClient,
    RealtimeDispatcher, RealtimeError, RealtimeEvent,
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Every event name the listener logs.
const LOGGED_EVENTS: [&str; 7] = [
    CONNECTED,
    NEW_NOTIFICATION,
    NOTIFICATION_READ_SYNC,
    SYSTEM_ANNOUNCEMENT,
    NOTIFICATION_CLICK,
    CONNECTION_STATUS,
    RECONNECT_EXHAUSTED,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rota_listener=debug,rota_realtime=debug,rota_events=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let bridge_config = BridgeConfig::from_env().context("Invalid alert configuration")?;
    let token = std::env::var("ROTA_TOKEN").map_err(|_| ConfigError::Missing("ROTA_TOKEN"))?;

    // --- Dispatcher ---
    let dispatcher = Arc::new(RealtimeDispatcher::new());
    for event in LOGGED_EVENTS {
        dispatcher.subscribe(event, log_event);
    }

    let (exhausted_tx, mut exhausted) = mpsc::unbounded_channel();
    dispatcher.subscribe(RECONNECT_EXHAUSTED, move |event: &RealtimeEvent| {
        if let RealtimeEvent::ReconnectExhausted { attempts } = event {
            let _ = exhausted_tx.send(*attempts);
        }
    });

    // --- Real-time client ---
    let client = RealtimeClient::from_env(Arc::clone(&dispatcher))
        .context("Invalid real-time configuration")?;
    tracing::info!(
        url = %client.config().url,
        max_attempts = client.config().reconnect.max_attempts,
        "Loaded real-time configuration",
    );

    // --- Native notification bridge ---
    let (surface, activity) = build_surface();
    let bridge = NativeBridge::new(surface, Arc::clone(&dispatcher), bridge_config);
    bridge.attach();
    if let Some(activity) = activity {
        bridge.listen(activity);
    }
    let permission = bridge.request_permission().await;
    tracing::info!(?permission, "Alert permission");

    // --- Connect ---
    client
        .connect(&token)
        .await
        .context("Failed to open real-time channel")?;

    let outcome = tokio::select! {
        () = shutdown_signal() => Ok(()),
        Some(attempts) = exhausted.recv() => Err(RealtimeError::ReconnectExhausted { attempts }),
    };

    client.disconnect();
    tracing::info!(active_alerts = bridge.active_alerts(), "Listener stopped");
    outcome.context("Real-time channel lost")
}

type ActivityStream = Option<mpsc::UnboundedReceiver<AlertActivity>>;

#[cfg(all(feature = "desktop", target_os = "linux"))]
fn build_surface() -> (Arc<dyn NotificationSurface>, ActivityStream) {
    let (surface, activity) = rota_realtime::surface::DesktopSurface::new("rota");
    (Arc::new(surface), Some(activity))
}

// The log surface renders nothing clickable.
#[cfg(not(all(feature = "desktop", target_os = "linux")))]
fn build_surface() -> (Arc<dyn NotificationSurface>, ActivityStream) {
    (Arc::new(rota_realtime::LogSurface::default()), None)
}

fn log_event(event: &RealtimeEvent) {
    match event {
        RealtimeEvent::NewNotification(data) => {
            let n = &data.notification;
            tracing::info!(
                notification_id = n.id,
                priority = %n.priority,
                title = %n.title,
                action_url = ?n.action_url,
                "Notification received",
            );
        }
        RealtimeEvent::NotificationReadSync(sync) => {
            tracing::info!(
                notification_id = sync.notification_id,
                read_at = %sync.read_at,
                "Notification read elsewhere",
            );
        }
        RealtimeEvent::SystemAnnouncement(a) => {
            tracing::info!(announcement = %a.announcement, "System announcement");
        }
        RealtimeEvent::Connected(info) => {
            tracing::info!(user_id = ?info.user_id, message = ?info.message, "Session confirmed");
        }
        RealtimeEvent::NotificationClick {
            notification_id,
            action_url,
        } => {
            tracing::info!(notification_id, %action_url, "Alert clicked");
        }
        RealtimeEvent::StatusChanged(status) => {
            tracing::info!(%status, "Connection status");
        }
        RealtimeEvent::ReconnectExhausted { attempts } => {
            tracing::warn!(attempts, "Reconnect attempts exhausted");
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), disconnecting"),
        () = terminate => tracing::info!("Received SIGTERM, disconnecting"),
    }
}
