//! HTTP error responses
//!
//! A rejected request answers with the classified status and a body holding a
//! single `error` frame, so SSE consumers decode it like any stream.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::events::error::INVALID_BODY;
use crate::events::{encode_frame, ErrorKind, RelayError};

#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::validation(INVALID_BODY, rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = StatusCode::from_u16(err.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match err.kind {
            ErrorKind::Process | ErrorKind::Unknown => {
                error!(kind = %err.kind, code = ?err.code, "Request failed: {}", err.message);
            }
            _ => {
                debug!(kind = %err.kind, code = ?err.code, "Request rejected: {}", err.message);
            }
        }

        let body = encode_frame(&err.to_event()).unwrap_or_default();
        (
            status,
            [(header::CONTENT_TYPE, "text/event-stream")],
            body,
        )
            .into_response()
    }
}
