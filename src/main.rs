//! Greenlight API server.
//!
//! ```text
//!     Client Request
//!     ─────────────▶ metrics → request id → trace → panic recovery → CORS
//!                    → timeout → body limit → rate limiter → authenticator
//!                    → router → [authorization gates] → handler
//!                                                         │
//!                                     ┌───────────────────┼──────────────┐
//!                                     ▼                   ▼              ▼
//!                               stores (Models)     token issuer   background
//!                               versioned update                   tasks (mail)
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use greenlight::config::{load_config, validate_config, ApiConfig, CliArgs};
use greenlight::lifecycle::signals;
use greenlight::observability::{logging, metrics};
use greenlight::{HttpServer, LogMailer, Models, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ApiConfig::default(),
    };
    args.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {error}");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "greenlight starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = %config.environment,
        limiter_enabled = config.limiter.enabled,
        limiter_rps = config.limiter.requests_per_second,
        limiter_burst = config.limiter.burst,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validated above.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let shutdown = Shutdown::new();
    signals::install(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let mailer = Arc::new(LogMailer::new(config.mailer.sender.clone()));
    let server = HttpServer::new(config, Models::in_memory(), mailer, shutdown);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
