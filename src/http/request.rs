//! Request-side helpers.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every request
//! - Decode JSON bodies into typed input, mapping failures to 400
//! - Parse `{id}` path parameters
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Unknown JSON fields are rejected by the input types themselves
//!   (`#[serde(deny_unknown_fields)]`)

use axum::{
    extract::{rejection::PathRejection, FromRequest, Path, Request},
    http::{HeaderValue, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::ApiError;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request IDs are random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestUuid;

impl MakeRequestId for RequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// `Json<T>` whose rejection is an [`ApiError::BadRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => Err(
                ApiError::BadRequest(format!("body must not be larger than {MAX_BODY_BYTES} bytes")),
            ),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// Resolve an `{id}` segment. Anything that is not a positive integer
/// names no resource.
pub fn read_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    match id {
        Ok(Path(id)) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}
