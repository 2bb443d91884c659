//! SSE live-tail handler.

use crate::tail::{LiveTail, StoreReader};
use crate::AppState;
use axum::{
    extract::Extension,
    http::{HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
};
use futures_util::StreamExt;
use std::{convert::Infallible, future, sync::Arc};

/// Handler for `GET /api/events/stream`.
///
/// Streams events stored after the session opened, oldest first, one
/// `data:` frame per event. Failed polls produce silence, never an error
/// frame. The stream ends when the client disconnects or the server starts
/// shutting down.
pub async fn live_tail_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let settings = state.tail;
    let reader = StoreReader::new(state.store.clone(), settings.query_timeout);
    let feed = LiveTail::starting_now(reader, settings.batch_size)
        .into_stream(settings.poll_interval)
        .take_until(state.shutdown.closed());

    let frames = feed.filter_map(|event| {
        future::ready(match serde_json::to_string(&event) {
            Ok(data) => Some(Ok::<_, Infallible>(Event::default().data(data))),
            Err(e) => {
                tracing::error!(id = %event.id, error = %e, "failed to serialize live-tail event");
                None
            }
        })
    });

    tracing::debug!("live-tail session opened");
    (
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(frames).keep_alive(KeepAlive::default()),
    )
}
