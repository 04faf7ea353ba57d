//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (metrics, request ID, tracing, panic recovery,
//!   CORS, timeout, body limit, rate limit, authentication)
//! - Attach per-route authorization requirements
//! - Bind the server to a listener and drain it on shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{authenticate, authorize, Authenticator, Authorizer, Requirement, RouteGuard, TokenIssuer};
use crate::config::ApiConfig;
use crate::data::{Models, MOVIES_READ, MOVIES_WRITE};
use crate::error::ApiError;
use crate::http::handlers::{health, movies, tokens, users};
use crate::http::request::{RequestUuid, MAX_BODY_BYTES, X_REQUEST_ID};
use crate::lifecycle::tasks::panic_message;
use crate::lifecycle::{BackgroundTasks, Shutdown};
use crate::mailer::Mailer;
use crate::observability::metrics;
use crate::security::{rate_limit, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub models: Models,
    pub issuer: TokenIssuer,
    pub mailer: Arc<dyn Mailer>,
    pub tasks: BackgroundTasks,
}

impl AppState {
    pub fn query_timeout(&self) -> Duration {
        self.config.timeouts.query()
    }
}

/// Reasons [`HttpServer::run`] can end unsuccessfully.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("in-flight requests did not finish within {0:?}")]
    DrainTimeout(Duration),

    #[error("server task failed: {0}")]
    Join(String),
}

/// HTTP server for the API.
pub struct HttpServer {
    router: Router,
    config: Arc<ApiConfig>,
    limiter: Arc<RateLimiter>,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server over the given stores and mailer.
    ///
    /// Background work spawned by handlers is tracked by `shutdown`.
    pub fn new(
        config: ApiConfig,
        models: Models,
        mailer: Arc<dyn Mailer>,
        shutdown: Shutdown,
    ) -> Self {
        let config = Arc::new(config);
        let query_timeout = config.timeouts.query();

        let limiter = Arc::new(RateLimiter::new(&config.limiter));
        let authenticator = Arc::new(Authenticator::new(models.users.clone(), query_timeout));
        let authorizer = Arc::new(Authorizer::new(models.permissions.clone(), query_timeout));

        let state = AppState {
            config: config.clone(),
            issuer: TokenIssuer::new(models.tokens.clone(), query_timeout),
            models,
            mailer,
            tasks: shutdown.tasks().clone(),
        };

        let router = Self::build_router(&config, state, limiter.clone(), authenticator, authorizer);
        Self {
            router,
            config,
            limiter,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers are listed innermost first; the last one sees the request first.
    #[allow(deprecated)]
    fn build_router(
        config: &ApiConfig,
        state: AppState,
        limiter: Arc<RateLimiter>,
        authenticator: Arc<Authenticator>,
        authorizer: Arc<Authorizer>,
    ) -> Router {
        let can_read = from_fn_with_state(
            RouteGuard::new(authorizer.clone(), Requirement::Permission(MOVIES_READ)),
            authorize,
        );
        let can_write = from_fn_with_state(
            RouteGuard::new(authorizer, Requirement::Permission(MOVIES_WRITE)),
            authorize,
        );

        Router::new()
            .route("/v1/healthcheck", get(health::healthcheck))
            .route("/v1/users", post(users::register))
            .route("/v1/users/activated", put(users::activate))
            .route("/v1/tokens/activation", post(tokens::create_activation))
            .route("/v1/tokens/authentication", post(tokens::create_authentication))
            .route(
                "/v1/movies",
                get(movies::list)
                    .route_layer(can_read.clone())
                    .merge(post(movies::create).route_layer(can_write.clone())),
            )
            .route(
                "/v1/movies/{id}",
                get(movies::show).route_layer(can_read).merge(
                    patch(movies::update)
                        .delete(movies::delete)
                        .route_layer(can_write),
                ),
            )
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
            .with_state(state)
            .layer(from_fn_with_state(authenticator, authenticate))
            .layer(from_fn_with_state(limiter, rate_limit))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                    user_id = tracing::field::Empty,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(RequestUuid))
            .layer(from_fn(metrics::track_metrics))
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// Serve until shutdown is triggered, then drain.
    ///
    /// In-flight requests get `timeouts.shutdown_grace_secs` to finish.
    /// Past that the accept loop is dropped and `run` moves on; connection
    /// tasks still running are not cancelled and end with the process.
    /// Background tasks are then waited for without a bound. The first
    /// error met along the way is returned once everything has stopped.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.config.environment,
            "HTTP server starting"
        );

        let sweeper = self.limiter.enabled().then(|| {
            self.limiter
                .clone()
                .spawn_sweeper(self.config.limiter.sweep_interval(), self.shutdown.clone())
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let stop = self.shutdown.clone();
        let mut serve = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.draining().await })
                .await
        });

        let grace = self.config.timeouts.shutdown_grace();
        let first_error = tokio::select! {
            finished = &mut serve => {
                // The listener died on its own; still drain background work.
                self.shutdown.trigger();
                served(finished)
            }
            _ = self.shutdown.draining() => {
                tracing::info!(grace = ?grace, "Stopped accepting connections, draining requests");
                match tokio::time::timeout(grace, &mut serve).await {
                    Ok(finished) => served(finished),
                    Err(_) => {
                        serve.abort();
                        tracing::warn!(grace = ?grace, "Grace period elapsed, abandoning in-flight requests");
                        Some(ServerError::DrainTimeout(grace))
                    }
                }
            }
        };

        let pending = self.shutdown.tasks().active_count();
        if pending > 0 {
            tracing::info!(pending, "Waiting for background tasks");
        }
        self.shutdown.drain().await;
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }
        self.shutdown.mark_stopped();

        match first_error {
            Some(e) => {
                tracing::error!(error = %e, "HTTP server stopped with error");
                Err(e)
            }
            None => {
                tracing::info!("HTTP server stopped");
                Ok(())
            }
        }
    }
}

fn served(result: Result<std::io::Result<()>, JoinError>) -> Option<ServerError> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(ServerError::Io(e)),
        Err(e) => Some(ServerError::Join(e.to_string())),
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal(format!("handler panicked: {}", panic_message(panic.as_ref()))).into_response()
}
