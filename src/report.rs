//! Maps pipeline errors to the shape returned to clients
//!
//! Validation failures are returned with their field detail. Internal
//! failures are logged in full and replaced by an opaque message.

use log::{error, info, warn};
use serde::Serialize;

use crate::error::{Error, ValidationFailure};

/// Message returned for every internal failure
pub const INTERNAL_MESSAGE: &str = "Something broke!";

/// Message returned while the renderer cannot take requests
pub const UNAVAILABLE_MESSAGE: &str = "Renderer is not ready";

/// Class of failure as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    BadRequest,
    Internal,
    Unavailable,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Internal => 500,
            ErrorKind::Unavailable => 503,
        }
    }
}

/// External error representation:
/// `{"statusCode": 400, "message": "BadRequest", "body": {"format": "..."}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub status_code: u16,
    #[serde(rename = "message")]
    pub kind: ErrorKind,
    #[serde(rename = "body")]
    pub detail: serde_json::Value,
}

impl ErrorReport {
    pub fn bad_request(failure: &ValidationFailure) -> Self {
        let detail = serde_json::to_value(failure).unwrap_or_else(|_| serde_json::Value::String(failure.to_string()));
        Self::new(ErrorKind::BadRequest, detail)
    }

    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal, INTERNAL_MESSAGE.into())
    }

    pub fn unavailable() -> Self {
        Self::new(ErrorKind::Unavailable, UNAVAILABLE_MESSAGE.into())
    }

    fn new(kind: ErrorKind, detail: serde_json::Value) -> Self {
        Self {
            status_code: kind.status_code(),
            kind,
            detail,
        }
    }
}

/// Log `err` for operators and build what the client gets to see
pub fn report(err: &Error) -> ErrorReport {
    match err {
        Error::BadRequest(failure) => {
            info!("rejected request: {}", failure);
            ErrorReport::bad_request(failure)
        }
        Error::NotReady => {
            warn!("render requested while the engine is not ready");
            ErrorReport::unavailable()
        }
        other => {
            error!("render failed: {:?}", other);
            ErrorReport::internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failures_keep_field_detail() {
        let err = Error::BadRequest(ValidationFailure::field("format", "Must be one of A4"));
        let report = report(&err);

        assert_eq!(report.status_code, 400);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "statusCode": 400,
                "message": "BadRequest",
                "body": { "format": "Must be one of A4" }
            })
        );
    }

    #[test]
    fn internal_failures_are_opaque() {
        let err = Error::LoadError("net::ERR_NAME_NOT_RESOLVED at https://internal.host".into());
        let report = report(&err);

        assert_eq!(report.status_code, 500);
        assert_eq!(report.kind, ErrorKind::Internal);
        let body = serde_json::to_string(&report).unwrap();
        assert!(!body.contains("internal.host"));
        assert!(body.contains(INTERNAL_MESSAGE));
    }

    #[test]
    fn timeouts_are_internal() {
        assert_eq!(report(&Error::Timeout(30000)).status_code, 500);
    }

    #[test]
    fn not_ready_is_unavailable() {
        let report = report(&Error::NotReady);
        assert_eq!(report.status_code, 503);
        assert_eq!(report.kind, ErrorKind::Unavailable);
    }
}
