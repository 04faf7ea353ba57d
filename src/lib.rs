//! Greenlight: a JSON API server with a governed request path.
//!
//! Every request passes the rate limiter and the authenticator before it is
//! routed; protected routes then run their authorization gates. Writes to
//! versioned resources are conditional on the version the client last read,
//! and shutdown drains in-flight requests and background work in order.

pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod mailer;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod validator;

pub use config::schema::ApiConfig;
pub use data::Models;
pub use error::ApiError;
pub use http::{HttpServer, ServerError};
pub use lifecycle::Shutdown;
pub use mailer::{LogMailer, Mailer};
