//! Bearer token authentication.
//!
//! # Responsibilities
//! - Turn the `Authorization` header into a [`Principal`]
//! - Reject malformed, unknown or expired tokens with 401
//! - Mark every response as varying on `Authorization`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::data::tokens::is_well_formed;
use crate::data::{Principal, Scope, StoreError, TokenHash, UserStore};
use crate::error::ApiError;
use crate::resilience::bounded;

/// Extract the token from a `Bearer <token>` header value.
///
/// The value must split on single spaces into exactly two parts with the
/// literal scheme `Bearer`.
pub fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Resolves requests to principals via the user store.
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    query_timeout: Duration,
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserStore>, query_timeout: Duration) -> Self {
        Self {
            users,
            query_timeout,
        }
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        self.resolve_at(headers.get(header::AUTHORIZATION), Utc::now())
            .await
    }

    /// Resolve an `Authorization` value as of `now`.
    pub async fn resolve_at(
        &self,
        authorization: Option<&HeaderValue>,
        now: DateTime<Utc>,
    ) -> Result<Principal, ApiError> {
        let value = match authorization {
            None => return Ok(Principal::Anonymous),
            Some(value) if value.is_empty() => return Ok(Principal::Anonymous),
            Some(value) => value.to_str().map_err(|_| ApiError::InvalidCredentials)?,
        };

        let token = bearer_token(value).ok_or(ApiError::InvalidCredentials)?;
        if !is_well_formed(token) {
            return Err(ApiError::InvalidCredentials);
        }

        let hash = TokenHash::of(token);
        let lookup = self.users.get_for_token(Scope::Authentication, &hash, now);
        match bounded(self.query_timeout, lookup).await {
            Ok(user) => Ok(Principal::User(user)),
            Err(StoreError::NotFound) => Err(ApiError::InvalidCredentials),
            Err(e) => Err(e.into()),
        }
    }
}

/// Middleware storing the resolved [`Principal`] as a request extension.
pub async fn authenticate(
    State(authenticator): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request.headers().get(header::AUTHORIZATION).cloned();

    let mut response = match authenticator
        .resolve_at(authorization.as_ref(), Utc::now())
        .await
    {
        Ok(principal) => {
            if let Principal::User(user) = &principal {
                tracing::Span::current().record("user_id", user.id);
            }
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Authentication failed");
            e.into_response()
        }
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}
