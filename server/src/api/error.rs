use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::ingest::FieldError;

/// Represents an API error.
///
/// `message` is the public half, serialized as the `error` field of the
/// response body; `internal_message` carries the cause and is only surfaced
/// on internal errors.
#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrCode,
    pub message: String,
    pub internal_message: Option<String>,
    pub details: Option<Vec<FieldError>>,
}

impl Error {
    pub fn internal<E>(cause: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            code: ErrCode::Internal,
            message: "Internal server error".into(),
            internal_message: Some(format!("{:#}", cause.into())),
            details: None,
        }
    }

    pub fn invalid_argument<S>(public_msg: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            code: ErrCode::InvalidArgument,
            message: public_msg.into(),
            internal_message: None,
            details: None,
        }
    }

    /// A schema rejection carrying the full list of field violations.
    pub fn validation(details: Vec<FieldError>) -> Self {
        Self {
            code: ErrCode::InvalidArgument,
            message: "Validation failed".into(),
            internal_message: None,
            details: Some(details),
        }
    }

    pub fn payload_too_large<E>(cause: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            code: ErrCode::PayloadTooLarge,
            message: "Request body too large".into(),
            internal_message: Some(format!("{:#}", cause.into())),
            details: None,
        }
    }

    pub fn not_found<S>(public_msg: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            code: ErrCode::NotFound,
            message: public_msg.into(),
            internal_message: None,
            details: None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.internal_message {
            Some(msg) => write!(f, "{}: {}", self.message, msg),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.code == ErrCode::Internal {
            log::error!("request failed: {self}");
        }

        let mut body = json!({ "error": self.message });
        if let Some(details) = &self.details {
            body["details"] = json!(details);
        }
        if self.code == ErrCode::Internal {
            if let Some(msg) = &self.internal_message {
                body["message"] = json!(msg);
            }
        }
        (self.code.status_code(), Json(body)).into_response()
    }
}

/// The error codes this service produces.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrCode {
    /// The request data cannot be parsed or fails schema validation.
    InvalidArgument,

    /// The request body exceeds the ingest size gate.
    PayloadTooLarge,

    /// No such endpoint.
    NotFound,

    /// An invariant of the service broke. The failed work is not stored.
    Internal,
}

impl ErrCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrCode::NotFound => StatusCode::NOT_FOUND,
            ErrCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for ErrCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrCode::InvalidArgument => write!(f, "invalid_argument"),
            ErrCode::PayloadTooLarge => write!(f, "payload_too_large"),
            ErrCode::NotFound => write!(f, "not_found"),
            ErrCode::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_http_statuses() {
        assert_eq!(ErrCode::InvalidArgument.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrCode::PayloadTooLarge.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ErrCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrCode::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_error_carries_details() {
        let err = Error::validation(vec![FieldError::new("trace_id", "trace_id is required")]);
        assert_eq!(err.code, ErrCode::InvalidArgument);
        assert_eq!(err.message, "Validation failed");
        assert_eq!(err.details.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn internal_cause_is_not_leaked_by_display_code() {
        let err = Error::internal(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "Internal server error: boom");
        assert_eq!(ErrCode::Internal.to_string(), "internal");
    }
}
