//! Inbound frame processing loop.
//!
//! Reads frames from an established [`Channel`](crate::Channel), decodes
//! them into typed messages and publishes each one on the dispatcher in
//! arrival order. Undecodable frames are logged and skipped so a bad
//! payload never tears down the channel.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{RealtimeDispatcher, RealtimeEvent};
use crate::messages::{parse_message, DecodeError};
use crate::transport::{CloseReason, InboundFrame};

/// Process frames until the channel closes or `cancel` fires.
///
/// Returns the close reason, or `None` when cancelled (the caller tore the
/// channel down itself and must not react to the closure).
pub async fn process_frames(
    inbound: &mut mpsc::UnboundedReceiver<InboundFrame>,
    client_id: &str,
    dispatcher: &RealtimeDispatcher,
    cancel: &CancellationToken,
) -> Option<CloseReason> {
    loop {
        let frame = tokio::select! {
            // Prefer cancellation so nothing is dispatched after disconnect().
            biased;
            _ = cancel.cancelled() => return None,
            frame = inbound.recv() => frame,
        };

        match frame {
            Some(InboundFrame::Text(text)) => handle_text_frame(&text, client_id, dispatcher),
            Some(InboundFrame::Closed(reason)) => return Some(reason),
            None => {
                return Some(CloseReason::Dropped(
                    "transport ended without close notification".into(),
                ))
            }
        }
    }
}

/// Decode a single text frame and publish it.
pub fn handle_text_frame(text: &str, client_id: &str, dispatcher: &RealtimeDispatcher) {
    let event = match parse_message(text) {
        Ok(message) => RealtimeEvent::from(message),
        Err(DecodeError::UnknownEvent(name)) => {
            tracing::debug!(client_id, event = %name, "Ignoring unknown event");
            return;
        }
        Err(e) => {
            tracing::warn!(
                client_id,
                error = %e,
                raw_message = %text,
                "Failed to decode inbound frame",
            );
            return;
        }
    };

    match &event {
        RealtimeEvent::NewNotification(data) => {
            tracing::debug!(
                client_id,
                notification_id = data.notification.id,
                priority = %data.notification.priority,
                "New notification",
            );
        }
        RealtimeEvent::NotificationReadSync(data) => {
            tracing::debug!(client_id, notification_id = data.notification_id, "Read state synced");
        }
        RealtimeEvent::Connected(info) => {
            tracing::debug!(client_id, user_id = ?info.user_id, "Server confirmed session");
        }
        _ => tracing::debug!(client_id, event = event.name(), "Inbound event"),
    }

    let outcome = dispatcher.publish(event.name(), &event);
    if outcome.faulted > 0 {
        tracing::warn!(
            client_id,
            event = event.name(),
            faulted = outcome.faulted,
            invoked = outcome.invoked,
            "Some subscribers faulted",
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::messages::{NEW_NOTIFICATION, SYSTEM_ANNOUNCEMENT};

    fn collect(dispatcher: &RealtimeDispatcher, event: &str) -> Arc<Mutex<Vec<RealtimeEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        dispatcher.subscribe(event, move |e: &RealtimeEvent| {
            seen_clone.lock().unwrap().push(e.clone())
        });
        seen
    }

    const ANNOUNCEMENT: &str = r#"{"type":"system_announcement","data":{"announcement":"Rota for March is live","timestamp":"2026-03-01T08:00:00Z"}}"#;

    #[tokio::test]
    async fn frames_are_dispatched_in_arrival_order_until_close() {
        let dispatcher = RealtimeDispatcher::new();
        let seen = collect(&dispatcher, SYSTEM_ANNOUNCEMENT);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(InboundFrame::Text(ANNOUNCEMENT.replace("March", "April"))).unwrap();
        tx.send(InboundFrame::Text(ANNOUNCEMENT.to_string())).unwrap();
        tx.send(InboundFrame::Closed(CloseReason::Dropped("reset".into()))).unwrap();

        let reason = process_frames(&mut rx, "c1", &dispatcher, &CancellationToken::new()).await;

        assert_eq!(reason, Some(CloseReason::Dropped("reset".into())));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        match &seen[0] {
            RealtimeEvent::SystemAnnouncement(a) => assert_eq!(a.announcement, "Rota for April is live"),
            other => panic!("Expected SystemAnnouncement, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_loop_returns_none() {
        let dispatcher = RealtimeDispatcher::new();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(process_frames(&mut rx, "c1", &dispatcher, &cancel).await.is_none());
    }

    #[tokio::test]
    async fn transport_hangup_counts_as_drop() {
        let dispatcher = RealtimeDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundFrame>();
        drop(tx);

        let reason = process_frames(&mut rx, "c1", &dispatcher, &CancellationToken::new()).await;
        assert!(reason.unwrap().is_retryable());
    }

    #[test]
    fn bad_frames_are_skipped() {
        let dispatcher = RealtimeDispatcher::new();
        let seen = collect(&dispatcher, NEW_NOTIFICATION);

        handle_text_frame("garbage", "c1", &dispatcher);
        handle_text_frame(r#"{"type":"shift_published","data":{}}"#, "c1", &dispatcher);
        handle_text_frame(r#"{"type":"new_notification","data":{"oops":true}}"#, "c1", &dispatcher);

        assert!(seen.lock().unwrap().is_empty());
    }
}
