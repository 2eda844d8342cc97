//! # API Errors
//!
//! Maps engine errors onto the wire error document:
//! `{ "errors": [ { status, code, title?, details? } ] }`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use trellis_core::{ErrorDocument, ErrorObject, TrellisError};

use super::types::INVALID_INPUT;

/// An engine error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub TrellisError);

impl ApiError {
    /// The HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TrellisError::NotFound { .. } => StatusCode::NOT_FOUND,
            TrellisError::BadRequest { .. }
            | TrellisError::UnknownResourceType(_)
            | TrellisError::UnknownRelationship { .. }
            | TrellisError::UnsupportedRelationshipCardinality { .. } => StatusCode::BAD_REQUEST,
            TrellisError::UnsupportedCapability { .. } => StatusCode::METHOD_NOT_ALLOWED,
            TrellisError::DuplicateResourceType(_)
            | TrellisError::ResourceMismatch(_)
            | TrellisError::Storage(_)
            | TrellisError::Config(_)
            | TrellisError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The single-entry error document sent to the client.
    #[must_use]
    pub fn document(&self) -> ErrorDocument {
        let status = self.status();
        let code = status.canonical_reason().unwrap_or("Unknown").to_string();

        let (title, details) = match &self.0 {
            TrellisError::NotFound { title, details }
            | TrellisError::BadRequest { title, details } => {
                (title.clone(), details.clone().map(Value::String))
            }
            other if status.is_server_error() => (
                Some(other.to_string()),
                Some(Value::String(format!("{:?}", other))),
            ),
            other => (Some(other.to_string()), None),
        };

        ErrorDocument::single(ErrorObject {
            status: status.as_u16().to_string(),
            code,
            title,
            details,
        })
    }
}

impl From<TrellisError> for ApiError {
    fn from(error: TrellisError) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TrellisError::bad_request(
            INVALID_INPUT,
            Some(rejection.body_text()),
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self.0);
        }
        (status, Json(self.document())).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
