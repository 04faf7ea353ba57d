//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack, graceful drain)
//!     → request.rs (request ID, JSON body and path decoding)
//!     → handlers/ (one module per resource)
//!     → response.rs (JSON envelope)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{JsonBody, RequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
