use std::collections::HashSet;
use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use bytes::Bytes;
use chrono::DateTime;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::error::Error;
use super::server::Deps;
use crate::sse::EventFilter;

/// Frames already rendered but not yet accepted by the client's socket.
/// The subscription's own queue is the real bound; this is just enough
/// slack to keep the writer task off the scheduler's hot path.
const SINK_BUFFER_FRAMES: usize = 16;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(rename = "traceId")]
    trace_id: Option<String>,
    kinds: Option<String>,
    since: Option<String>,
}

/// `GET /events`: registers a subscription and streams it as SSE.
///
/// The response body stays open until the client disconnects or the server
/// shuts down; frames arrive as events are ingested, interleaved with
/// heartbeat comments while idle.
pub async fn events(State(deps): State<Deps>, Query(query): Query<EventsQuery>) -> Result<Response, Error> {
    let filter = parse_filter(query)?;

    let (tx, rx) = mpsc::channel::<Bytes>(SINK_BUFFER_FRAMES);
    let id = deps.sse.subscribe(filter, tx);
    log::trace!(subscription = id; "events stream opened");

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(Error::internal)
}

fn parse_filter(query: EventsQuery) -> Result<EventFilter, Error> {
    let since = match query.since.as_deref() {
        None => None,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts),
            Err(_) => return Err(Error::invalid_argument("Invalid since parameter")),
        },
    };

    let kinds = query.kinds.as_deref().and_then(|raw| {
        let set: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        (!set.is_empty()).then_some(set)
    });

    Ok(EventFilter {
        trace_id: query.trace_id,
        kinds,
        since,
    })
}
