//! Per-route authorization gates.
//!
//! A route declares a [`Requirement`]; the requirement expands into an
//! ordered list of [`Gate`]s which a single dispatcher evaluates in turn.
//! The first failing gate decides the response.
//!
//! ```text
//! Authenticated  → 401 AuthenticationRequired
//! Activated      → 403 AccountNotActivated
//! Permission(p)  → 403 NotPermitted
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::data::{PermissionStore, Permissions, Principal, User};
use crate::error::ApiError;
use crate::resilience::bounded;

/// A single pass/fail check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Authenticated,
    Activated,
    Permission(&'static str),
}

/// What a route demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Activated,
    Permission(&'static str),
}

impl Requirement {
    /// Gates implied by this requirement, in evaluation order.
    pub fn gates(self) -> Vec<Gate> {
        match self {
            Requirement::Authenticated => vec![Gate::Authenticated],
            Requirement::Activated => vec![Gate::Authenticated, Gate::Activated],
            Requirement::Permission(code) => {
                vec![Gate::Authenticated, Gate::Activated, Gate::Permission(code)]
            }
        }
    }
}

pub fn require_authenticated(principal: &Principal) -> Result<&User, ApiError> {
    principal.user().ok_or(ApiError::AuthenticationRequired)
}

pub fn require_activated(user: &User) -> Result<(), ApiError> {
    if user.activated {
        Ok(())
    } else {
        Err(ApiError::AccountNotActivated)
    }
}

pub fn require_permission(permissions: &Permissions, code: &str) -> Result<(), ApiError> {
    if permissions.includes(code) {
        Ok(())
    } else {
        Err(ApiError::NotPermitted)
    }
}

/// Evaluates gate chains against the permission store.
#[derive(Clone)]
pub struct Authorizer {
    permissions: Arc<dyn PermissionStore>,
    query_timeout: Duration,
}

impl Authorizer {
    pub fn new(permissions: Arc<dyn PermissionStore>, query_timeout: Duration) -> Self {
        Self {
            permissions,
            query_timeout,
        }
    }

    pub async fn authorize(
        &self,
        principal: &Principal,
        requirement: Requirement,
    ) -> Result<(), ApiError> {
        for gate in requirement.gates() {
            match gate {
                Gate::Authenticated => {
                    require_authenticated(principal)?;
                }
                Gate::Activated => require_activated(require_authenticated(principal)?)?,
                Gate::Permission(code) => {
                    let user = require_authenticated(principal)?;
                    let permissions = bounded(
                        self.query_timeout,
                        self.permissions.get_all_for_user(user.id),
                    )
                    .await?;
                    require_permission(&permissions, code)?;
                }
            }
        }
        Ok(())
    }
}

/// Route-layer state pairing an authorizer with one requirement.
#[derive(Clone)]
pub struct RouteGuard {
    authorizer: Arc<Authorizer>,
    requirement: Requirement,
}

impl RouteGuard {
    pub fn new(authorizer: Arc<Authorizer>, requirement: Requirement) -> Self {
        Self {
            authorizer,
            requirement,
        }
    }
}

/// Middleware enforcing a [`RouteGuard`]. Must run after `authenticate`.
pub async fn authorize(
    State(guard): State<RouteGuard>,
    request: Request,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<Principal>().cloned() else {
        return ApiError::Internal("no principal on request; authenticate layer missing".into())
            .into_response();
    };

    match guard.authorizer.authorize(&principal, guard.requirement).await {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(error = %e, requirement = ?guard.requirement, "Authorization denied");
            e.into_response()
        }
    }
}
