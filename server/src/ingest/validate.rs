//! Event schema validation.
//!
//! Runs on already-truncated JSON values and collects every violation in a
//! payload rather than stopping at the first, so a single 400 response can
//! name all offending fields.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

use crate::model::{Event, SpanEvent, SpanStatus, TraceEvent};

/// A single schema violation, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// One or more schema violations within a single ingest payload.
#[derive(Debug, Clone, thiserror::Error)]
#[error("validation failed with {} issue(s)", .0.len())]
pub struct ValidationError(pub Vec<FieldError>);

/// Validates a single raw event value against the event schema.
///
/// `path` prefixes reported field paths (empty for a bare event,
/// `batch[3]` for a batch element). Unknown extra fields are ignored so
/// newer producers keep working against this server.
pub fn validate_event(value: &Value, path: &str) -> Result<Event, Vec<FieldError>> {
    let Some(obj) = value.as_object() else {
        return Err(vec![FieldError::new(
            path.to_string(),
            "event must be a JSON object",
        )]);
    };

    let mut errors = Vec::new();
    let event = match obj.get("type") {
        Some(Value::String(t)) if t == "trace" => {
            Some(Event::Trace(validate_trace(obj, path, &mut errors)))
        }
        Some(Value::String(t)) if t == "span" => {
            Some(Event::Span(validate_span(obj, path, &mut errors)))
        }
        Some(Value::String(other)) => {
            errors.push(FieldError::new(
                join(path, "type"),
                format!("unknown event type {other:?}"),
            ));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(join(path, "type"), "type must be a string"));
            None
        }
        None => {
            errors.push(FieldError::new(join(path, "type"), "type is required"));
            None
        }
    };

    match event {
        Some(event) if errors.is_empty() => Ok(event),
        _ => Err(errors),
    }
}

fn validate_trace(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> TraceEvent {
    let started_at = timestamp(obj, "started_at", path, errors);
    let ended_at = timestamp(obj, "ended_at", path, errors);
    check_ordering(started_at.as_deref(), ended_at.as_deref(), path, errors);

    TraceEvent {
        trace_id: required_id(obj, "trace_id", path, errors),
        name: string(obj, "name", path, errors),
        group_id: string(obj, "group_id", path, errors),
        started_at,
        ended_at,
        metadata: metadata(obj, path, errors),
    }
}

fn validate_span(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> SpanEvent {
    let started_at = timestamp(obj, "started_at", path, errors);
    let ended_at = timestamp(obj, "ended_at", path, errors);
    check_ordering(started_at.as_deref(), ended_at.as_deref(), path, errors);

    SpanEvent {
        trace_id: required_id(obj, "trace_id", path, errors),
        span_id: required_id(obj, "span_id", path, errors),
        parent_id: string(obj, "parent_id", path, errors),
        kind: string(obj, "kind", path, errors),
        name: string(obj, "name", path, errors),
        started_at,
        ended_at,
        data: data(obj, path, errors),
        status: status(obj, path, errors),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn required_id(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> String {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(_) => {
            errors.push(FieldError::new(
                join(path, key),
                format!("{key} must be a non-empty string"),
            ));
            String::new()
        }
        None => {
            errors.push(FieldError::new(
                join(path, key),
                format!("{key} is required"),
            ));
            String::new()
        }
    }
}

fn string(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(
                join(path, key),
                format!("{key} must be a string"),
            ));
            None
        }
    }
}

fn timestamp(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let value = string(obj, key, path, errors)?;
    match DateTime::parse_from_rfc3339(&value) {
        Ok(_) => Some(value),
        Err(_) => {
            errors.push(FieldError::new(
                join(path, key),
                format!("{key} must be an RFC 3339 timestamp"),
            ));
            None
        }
    }
}

fn check_ordering(
    started_at: Option<&str>,
    ended_at: Option<&str>,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    let (Some(started), Some(ended)) = (started_at, ended_at) else {
        return;
    };
    // Both strings have already passed RFC 3339 validation.
    let (Ok(started), Ok(ended)) = (
        DateTime::parse_from_rfc3339(started),
        DateTime::parse_from_rfc3339(ended),
    ) else {
        return;
    };
    if started > ended {
        errors.push(FieldError::new(
            join(path, "ended_at"),
            "ended_at must be >= started_at",
        ));
    }
}

fn metadata(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<BTreeMap<String, String>> {
    match obj.get("metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                match v {
                    Value::String(s) => {
                        out.insert(k.clone(), s.clone());
                    }
                    _ => errors.push(FieldError::new(
                        join(path, &format!("metadata.{k}")),
                        "metadata values must be strings",
                    )),
                }
            }
            Some(out)
        }
        Some(_) => {
            errors.push(FieldError::new(
                join(path, "metadata"),
                "metadata must be an object",
            ));
            None
        }
    }
}

fn data(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<serde_json::Map<String, Value>> {
    match obj.get("data") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            errors.push(FieldError::new(
                join(path, "data"),
                "data must be an object",
            ));
            None
        }
    }
}

fn status(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<SpanStatus> {
    match obj.get("status") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s == "ok" => Some(SpanStatus::Ok),
        Some(Value::String(s)) if s == "error" => Some(SpanStatus::Error),
        Some(_) => {
            errors.push(FieldError::new(
                join(path, "status"),
                r#"status must be "ok" or "error""#,
            ));
            None
        }
    }
}
