//! Authentication and authorization.
//!
//! # Data Flow
//! ```text
//! Incoming request (after rate limiting):
//!     → authenticate.rs (Authorization header → Principal extension)
//!     → gates.rs (per-route: authenticated → activated → permission)
//!     → handler
//!
//! Handlers needing credentials:
//!     → issuer.rs (generate, hash, persist, return plaintext)
//! ```
//!
//! # Design Decisions
//! - A missing header is not an error; the request runs as anonymous
//! - Gates run in a fixed order and stop at the first failure
//! - Only token hashes cross into the persistence layer

pub mod authenticate;
pub mod gates;
pub mod issuer;

pub use authenticate::{authenticate, bearer_token, Authenticator};
pub use gates::{authorize, Authorizer, Gate, Requirement, RouteGuard};
pub use issuer::TokenIssuer;
