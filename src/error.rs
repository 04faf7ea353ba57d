//! Request error taxonomy and its HTTP mapping.
//!
//! Every failure on the request path ends up as an [`ApiError`]. The
//! response body is always a JSON envelope `{"error": ...}`; validation
//! failures carry a field → message map, everything else a message string.
//! Internal faults are logged in full and returned as an opaque message.

use std::collections::BTreeMap;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::data::StoreError;

/// Message returned to clients for any internal fault.
pub const INTERNAL_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Errors surfaced by the request governance pipeline and handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed, unknown or expired bearer token.
    #[error("invalid or missing authentication token")]
    InvalidCredentials,

    /// Email/password pair did not match when requesting a token.
    #[error("invalid authentication credentials")]
    BadCredentials,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    AccountNotActivated,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the method is not supported for this resource")]
    MethodNotAllowed,

    /// Body could not be decoded.
    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed")]
    ValidationFailed(BTreeMap<String, String>),

    /// Detail is logged, never sent to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Single-field validation failure.
    pub fn field(key: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(key.into(), message.into());
        ApiError::ValidationFailed(fields)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials
            | ApiError::BadCredentials
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::AccountNotActivated | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::ValidationFailed(fields) => json!({ "error": fields }),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed with internal error");
                json!({ "error": INTERNAL_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        match self {
            ApiError::InvalidCredentials => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            // The response may follow a partially handled request; do not reuse the connection.
            ApiError::Internal(_) => {
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }
        response
    }
}
