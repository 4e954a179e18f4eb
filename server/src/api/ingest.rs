use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use super::error::Error;
use super::server::Deps;
use crate::ingest::{self, FieldError};

/// The ingest body size gate, in bytes.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub count: usize,
}

/// `POST /ingest`: accepts one event or `{"batch": [...]}`.
///
/// The payload is truncated and validated as a whole before anything is
/// stored, so a request either lands all of its events or none. Accepted
/// events are appended to the store and broadcast to subscribers in
/// payload order.
pub async fn ingest(
    State(deps): State<Deps>,
    req: Request,
) -> Result<Json<IngestResponse>, Error> {
    // Oversized uploads are rejected on the declared length, before the
    // body is read.
    if let Some(declared) = content_length(req.headers()) {
        if declared > MAX_BODY_BYTES as u64 {
            return Err(Error::payload_too_large(anyhow::anyhow!(
                "declared content-length {declared} exceeds {MAX_BODY_BYTES}"
            )));
        }
    }

    // The read limit also catches chunked bodies that never declare one.
    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(Error::payload_too_large)?;

    let value: Value = serde_json::from_slice(&body).map_err(|err| {
        Error::validation(vec![FieldError::new("", format!("invalid JSON: {err}"))])
    })?;

    let events = ingest::process_payload(value).map_err(|err| Error::validation(err.0))?;

    let count = events.len();
    for event in events {
        let event = Arc::new(event);
        deps.store.append(event.clone());
        deps.sse.broadcast(&event);
    }
    log::debug!(count = count; "ingested events");

    Ok(Json(IngestResponse {
        success: true,
        count,
    }))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
}
