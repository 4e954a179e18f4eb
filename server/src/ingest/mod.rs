//! The ingest pipeline: truncate, then validate.
//!
//! The whole payload is processed before anything is stored, so a request
//! either lands all of its events or none of them.

pub mod truncate;
pub mod validate;

use serde_json::Value;

pub use validate::{FieldError, ValidationError};

use crate::model::Event;

/// Turns a parsed request body into validated events, in payload order.
///
/// The body is either a bare event object or `{"batch": [...]}`. Every
/// element is truncated and validated; violations across the entire payload
/// are reported together and nothing is returned alongside them.
pub fn process_payload(mut value: Value) -> Result<Vec<Event>, ValidationError> {
    let mut events = Vec::new();
    let mut errors = Vec::new();

    let is_batch = value
        .as_object()
        .is_some_and(|obj| obj.contains_key("batch"));
    if is_batch {
        match value.as_object_mut().and_then(|obj| obj.get_mut("batch")) {
            Some(Value::Array(items)) => {
                for (i, item) in items.iter_mut().enumerate() {
                    truncate::truncate_event(item);
                    match validate::validate_event(item, &format!("batch[{i}]")) {
                        Ok(event) => events.push(event),
                        Err(mut errs) => errors.append(&mut errs),
                    }
                }
            }
            _ => errors.push(FieldError::new("batch", "batch must be an array of events")),
        }
    } else {
        truncate::truncate_event(&mut value);
        match validate::validate_event(&value, "") {
            Ok(event) => events.push(event),
            Err(errs) => errors = errs,
        }
    }

    if errors.is_empty() {
        Ok(events)
    } else {
        Err(ValidationError(errors))
    }
}
