//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP token bucket, 429 when empty)
//!     → auth (resolve principal)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Limiter state lives in memory only; restarts reset every bucket
//! - Fail closed: a request without a peer address is an internal error

pub mod rate_limit;

pub use rate_limit::{rate_limit, RateLimiter};
