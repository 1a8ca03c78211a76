//! Server-Sent Events for live thread observers

use crate::exchange::ExchangePhase;
use crate::thread::{ThreadEvent, ThreadSnapshot};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Init event with the current thread, then every change as it happens.
///
/// Subscribe before taking `snapshot`; clients drop events whose version is
/// not newer than the one they hold.
pub fn sse_stream(
    snapshot: ThreadSnapshot,
    phase: ExchangePhase,
    events: broadcast::Receiver<ThreadEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok(Event::default().event("init").data(
            json!({
                "type": "init",
                "version": snapshot.version,
                "phase": phase,
                "messages": snapshot.messages,
            })
            .to_string(),
        ))
    });

    let updates = BroadcastStream::new(events).filter_map(|result| match result {
        Ok(event) => Some(Ok(thread_event_to_sse(event))),
        Err(e) => {
            tracing::debug!(error = %e, "SSE subscriber lagged, skipping events");
            None
        }
    });

    Sse::new(init.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn thread_event_to_sse(event: ThreadEvent) -> Event {
    let (event_type, data) = match event {
        ThreadEvent::Token {
            version,
            index,
            token,
        } => (
            "token",
            json!({
                "type": "token",
                "version": version,
                "index": index,
                "token": token,
            }),
        ),
        ThreadEvent::Snapshot(snapshot) => (
            "snapshot",
            json!({
                "type": "snapshot",
                "version": snapshot.version,
                "messages": snapshot.messages,
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
