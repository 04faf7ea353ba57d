//! Response helpers.
//!
//! Successful bodies are wrapped in a single-key envelope, e.g.
//! `{"movie": {...}}`, so clients can tell resources apart by key.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Serialize `value` under `key` with the given status.
pub fn envelope<T: Serialize>(status: StatusCode, key: &str, value: &T) -> Result<Response, ApiError> {
    let mut body = Map::new();
    body.insert(key.to_string(), to_value(value)?);
    Ok((status, Json(Value::Object(body))).into_response())
}

/// A page of records under `key`, with pagination details under `metadata`.
pub fn paged<T: Serialize, M: Serialize>(
    status: StatusCode,
    key: &str,
    records: &T,
    metadata: &M,
) -> Result<Response, ApiError> {
    let mut body = Map::new();
    body.insert(key.to_string(), to_value(records)?);
    body.insert("metadata".to_string(), to_value(metadata)?);
    Ok((status, Json(Value::Object(body))).into_response())
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(format!("serializing response: {e}")))
}

/// `{"message": ...}` envelope.
pub fn message(status: StatusCode, text: &str) -> Result<Response, ApiError> {
    envelope(status, "message", &text)
}
