//! Registration and activation.

use axum::{extract::State, http::StatusCode, response::Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{blocking, deliver};
use crate::data::tokens::validate_token_plaintext;
use crate::data::users::{validate_identity, validate_password_plaintext};
use crate::data::{Password, Scope, StoreError, TokenHash, User, MOVIES_READ};
use crate::error::ApiError;
use crate::http::request::JsonBody;
use crate::http::response::envelope;
use crate::http::server::AppState;
use crate::mailer::USER_WELCOME;
use crate::observability::metrics;
use crate::resilience::bounded;
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /v1/users`
pub async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    validate_identity(&mut v, &input.name, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let plaintext = input.password;
    let password = blocking(move || Password::hash(&plaintext))
        .await?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut user = User::new(input.name, input.email, password);

    let timeout = state.query_timeout();
    match bounded(timeout, state.models.users.insert(&mut user)).await {
        Ok(()) => {}
        Err(StoreError::DuplicateEmail) => {
            return Err(ApiError::field(
                "email",
                "a user with this email address already exists",
            ))
        }
        Err(e) => return Err(e.into()),
    }

    bounded(
        timeout,
        state.models.permissions.add_for_user(user.id, &[MOVIES_READ]),
    )
    .await?;

    let token = state
        .issuer
        .issue(user.id, Scope::Activation.ttl(), Scope::Activation)
        .await?;

    tracing::info!(user_id = user.id, "Registered user");
    deliver(
        &state,
        user.email.clone(),
        USER_WELCOME,
        json!({ "activationToken": token.plaintext, "userID": user.id }),
    );

    envelope(StatusCode::CREATED, "user", &user)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateInput {
    #[serde(default)]
    token: String,
}

/// `PUT /v1/users/activated`
pub async fn activate(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateInput>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.finish()?;

    let timeout = state.query_timeout();
    let hash = TokenHash::of(&input.token);
    let lookup = state
        .models
        .users
        .get_for_token(Scope::Activation, &hash, Utc::now());
    let mut user = match bounded(timeout, lookup).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(ApiError::field("token", "invalid or expired activation token"))
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    if let Err(e) = bounded(timeout, state.models.users.update(&mut user)).await {
        if e == StoreError::EditConflict {
            metrics::record_edit_conflict("user");
        }
        return Err(e.into());
    }

    state
        .issuer
        .delete_all_for_scope(Scope::Activation, user.id)
        .await?;

    tracing::info!(user_id = user.id, "Activated user");
    envelope(StatusCode::OK, "user", &user)
}
