//! Route handlers.
//!
//! Handlers only shape input and output; authentication, authorization and
//! rate limiting have already happened in the middleware stack by the time
//! one runs.

pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;

use serde_json::Value;

use crate::error::ApiError;
use crate::http::server::AppState;

/// Send mail from a tracked background task. Failures are logged only.
pub(crate) fn deliver(state: &AppState, recipient: String, template: &'static str, data: Value) {
    let mailer = state.mailer.clone();
    state.tasks.spawn("mail", async move {
        if let Err(e) = mailer.send(&recipient, template, data).await {
            tracing::error!(error = %e, template, "Failed to send mail");
        }
    });
}

/// Run CPU-bound work such as password hashing off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))
}
