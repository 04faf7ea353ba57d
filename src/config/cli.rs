//! Command-line overrides.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::ApiConfig;

#[derive(Debug, Parser)]
#[command(name = "greenlight")]
#[command(version, about = "JSON API server with authentication, rate limiting and edit-conflict detection", long_about = None)]
pub struct CliArgs {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// API server port (binds 0.0.0.0).
    #[arg(long)]
    pub port: Option<u16>,

    /// Environment (development|staging|production).
    #[arg(long)]
    pub env: Option<String>,

    /// Rate limiter maximum requests per second.
    #[arg(long)]
    pub limiter_rps: Option<f64>,

    /// Rate limiter maximum burst.
    #[arg(long)]
    pub limiter_burst: Option<u32>,

    /// Enable rate limiter.
    #[arg(long)]
    pub limiter_enabled: Option<bool>,
}

impl CliArgs {
    /// Flags given on the command line win over file values.
    pub fn apply(&self, config: &mut ApiConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = format!("0.0.0.0:{port}");
        }
        if let Some(env) = &self.env {
            config.environment = env.clone();
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
    }
}
