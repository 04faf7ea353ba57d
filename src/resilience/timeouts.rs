//! Deadlines for downstream persistence calls.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors (`StoreError::Timeout`)
//! - A timed-out request is answered with 500, never retried

use std::future::Future;
use std::time::Duration;

use crate::data::StoreError;

/// Run a store call under `deadline`.
pub async fn bounded<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Store call exceeded deadline");
            Err(StoreError::Timeout)
        }
    }
}
