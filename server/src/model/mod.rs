use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// A workflow envelope. At most one per trace id is current at a time;
/// a producer re-emitting the envelope replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// A single operation within a trace. `parent_id` links spans into a tree;
/// the link is advisory and resolution is left to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanEvent {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// An ingested telemetry event. Events are immutable once validated;
/// timestamps are kept as the original RFC 3339 strings so that stored
/// events re-serialize exactly as they arrived.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Trace(TraceEvent),
    Span(SpanEvent),
}

impl Event {
    pub fn trace_id(&self) -> &str {
        match self {
            Event::Trace(t) => &t.trace_id,
            Event::Span(s) => &s.trace_id,
        }
    }

    pub fn is_span(&self) -> bool {
        matches!(self, Event::Span(_))
    }

    /// The span kind tag, if this is a span that carries one.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Event::Trace(_) => None,
            Event::Span(s) => s.kind.as_deref(),
        }
    }

    pub fn started_at(&self) -> Option<&str> {
        match self {
            Event::Trace(t) => t.started_at.as_deref(),
            Event::Span(s) => s.started_at.as_deref(),
        }
    }
}
