//! Token issuance endpoints.

use axum::{extract::State, http::StatusCode, response::Response};
use serde::Deserialize;
use serde_json::json;

use super::{blocking, deliver};
use crate::data::users::{validate_email, validate_password_plaintext};
use crate::data::{Scope, StoreError, User};
use crate::error::ApiError;
use crate::http::request::JsonBody;
use crate::http::response::{envelope, message};
use crate::http::server::AppState;
use crate::mailer::TOKEN_ACTIVATION;
use crate::resilience::bounded;
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivationTokenInput {
    #[serde(default)]
    email: String,
}

/// `POST /v1/tokens/activation`
pub async fn create_activation(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivationTokenInput>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    v.finish()?;

    let user = match find_by_email(&state, &input.email).await? {
        Some(user) => user,
        None => return Err(ApiError::field("email", "no matching email address found")),
    };
    if user.activated {
        return Err(ApiError::field("email", "user has already been activated"));
    }

    let token = state
        .issuer
        .issue(user.id, Scope::Activation.ttl(), Scope::Activation)
        .await?;

    // Mail goes to the stored address, not the one typed into this request.
    deliver(
        &state,
        user.email,
        TOKEN_ACTIVATION,
        json!({ "activationToken": token.plaintext }),
    );

    message(
        StatusCode::ACCEPTED,
        "an email will be sent to you containing activation instructions",
    )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationTokenInput {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /v1/tokens/authentication`
pub async fn create_authentication(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<AuthenticationTokenInput>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let user = find_by_email(&state, &input.email)
        .await?
        .ok_or(ApiError::BadCredentials)?;
    let password = user.password.clone();
    let candidate = input.password;
    if !blocking(move || password.matches(&candidate)).await? {
        return Err(ApiError::BadCredentials);
    }

    let token = state
        .issuer
        .issue(user.id, Scope::Authentication.ttl(), Scope::Authentication)
        .await?;

    tracing::info!(user_id = user.id, "Issued authentication token");
    envelope(StatusCode::CREATED, "authentication_token", &token)
}

async fn find_by_email(state: &AppState, email: &str) -> Result<Option<User>, ApiError> {
    match bounded(state.query_timeout(), state.models.users.get_by_email(email)).await {
        Ok(user) => Ok(Some(user)),
        Err(StoreError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
