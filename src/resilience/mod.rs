//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call into a store:
//!     → timeouts.rs (enforce per-call deadline)
//!     → On expiry: StoreError::Timeout → 500 to the caller
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every persistence call has a deadline
//! - No automatic retries: conflicts and failures go back to the caller

pub mod timeouts;

pub use timeouts::bounded;
