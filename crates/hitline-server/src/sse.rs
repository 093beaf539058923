use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::coordinator::SessionEvent;
use crate::state::{AppState, ConnectionGuard};

/// SSE event name for a session event.
fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::LifecycleChanged { .. } => "lifecycle",
        SessionEvent::DeviceOutcome { .. } => "device",
        SessionEvent::HitRecorded { .. } => "hit",
        SessionEvent::AutoStop { .. } => "auto_stop",
        SessionEvent::Finalized { .. } => "finalized",
        SessionEvent::PersistenceWarning { .. } => "warning",
    }
}

/// GET /api/v1/session/events: SSE stream of session events.
pub async fn session_event_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let max_sse = state.config.limits.max_sse_subscribers;
    let current = state.sse_subscriber_count.load(Ordering::Relaxed);
    if current >= max_sse {
        tracing::warn!(current, max = max_sse, "SSE subscriber limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let guard = ConnectionGuard::new(Arc::clone(&state.sse_subscriber_count));
    let rx = state.session.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let _guard = &guard;
        match result {
            Ok(event) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                Some(Ok(SseEvent::default().event(event_name(&event)).data(json)))
            },
            Err(e) => {
                tracing::warn!("SSE broadcast receive error: {e}");
                None
            },
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitline_core::session::StopReason;

    #[test]
    fn event_names_are_stable() {
        assert_eq!(
            event_name(&SessionEvent::AutoStop {
                reason: StopReason::Duration
            }),
            "auto_stop"
        );
        assert_eq!(
            event_name(&SessionEvent::HitRecorded {
                device_id: "a".into(),
                timestamp_ms: 1,
                count: 1,
            }),
            "hit"
        );
    }
}
