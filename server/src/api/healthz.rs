use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::server::Deps;

#[derive(Serialize)]
pub struct Response {
    pub status: String,
    pub timestamp: String,
    pub events: EventStats,
    pub subscribers: usize,
}

#[derive(Serialize)]
pub struct EventStats {
    pub count: usize,
    pub capacity: usize,
}

/// `GET /healthz`: liveness plus current store and subscriber occupancy.
pub async fn healthz(State(deps): State<Deps>) -> Json<Response> {
    Json(Response {
        status: "ok".into(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        events: EventStats {
            count: deps.store.len(),
            capacity: deps.store.capacity(),
        },
        subscribers: deps.sse.subscriber_count(),
    })
}

/// `GET /`: a self-describing index.
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "ariadne",
        "endpoints": {
            "POST /ingest": "ingest a trace/span event or {\"batch\": [...]}",
            "GET /events": "live SSE stream; filters: traceId, kinds, since",
            "GET /healthz": "liveness and buffer occupancy",
        },
    }))
}
