//! Balance/pending refresh events for connected clients.
//!
//! Mutating handlers publish [`ServerEvent`]s to a broadcast channel; this
//! module exposes the channel over SSE. Subscribers that lag simply miss
//! events and re-fetch on the next one; the stream ends when the server
//! shuts down.

use std::convert::Infallible;

use axum::extract::{Extension, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use fantastic_task_shared::api::ServerEvent;
use futures::Stream;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use super::{AppState, auth::AuthCtx};

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Publish an event to all connected subscribers. Safe to call when nobody
/// is listening.
pub fn publish(state: &AppState, event: ServerEvent) {
    if let Err(e) = state.events.send(event) {
        trace!(error = %e, "events: no subscribers");
    }
}

pub async fn api_events(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let shutdown = state.shutdown_token();
    let stream = BroadcastStream::new(rx)
        .filter_map(|res| res.ok())
        .filter_map(|ev| Event::default().json_data(&ev).ok())
        .map(Ok::<_, Infallible>);
    let stream = futures::StreamExt::take_until(stream, shutdown.cancelled_owned());
    Sse::new(stream).keep_alive(KeepAlive::default())
}
