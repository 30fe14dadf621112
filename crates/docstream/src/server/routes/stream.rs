//! Server-sent event stream of document updates

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;

use super::OwnerId;
use crate::error::Result;
use crate::server::state::AppState;
use crate::types::StreamEvent;

/// GET /api/stream - Snapshot, then live updates and heartbeats
///
/// The subscription lives inside the response stream; when the client
/// disconnects axum drops the stream, which unsubscribes.
pub async fn stream_events(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let subscription = state.broadcaster().subscribe(&owner_id).await?;
    let stream = subscription.map(|event| Ok(to_sse(&event)));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.config().events.heartbeat_interval())
            .text("keep-alive"),
    ))
}

/// One SSE message: the event kind as name, the JSON as data
pub fn to_sse(event: &StreamEvent) -> Event {
    match Event::default().event(event.kind()).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::error!("Failed to serialize {} event: {}", event.kind(), e);
            Event::default().event("error").data(e.to_string())
        }
    }
}
