//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── server: ServerConfig          # Host, port, shutdown
//! ├── middleware: MiddlewareConfig  # Request timeout
//! └── service: ServiceConfig        # Stream buffering, heartbeats, limits
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! relay --port 8080 --stream-size-threshold 8192
//!
//! # Or via environment variables
//! PORT=8080 STREAM_SIZE_THRESHOLD=8192 relay
//! ```

mod middleware;
mod server;

use std::process;

use anyhow::Context;
use clap::Parser;
pub use middleware::MiddlewareConfig;
use relay_server::service::ServiceConfig;
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "relay")]
#[command(about = "Real-time text streaming server")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// HTTP middleware configuration.
    #[clap(flatten)]
    pub middleware: MiddlewareConfig,

    /// Stream delivery and producer configuration.
    #[clap(flatten)]
    pub service: ServiceConfig,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so clap can use its values as defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.service
            .validate()
            .context("invalid stream configuration")?;
        Ok(())
    }

    /// Logs startup information and the effective configuration.
    pub fn log(&self) {
        Self::log_build_info();
        self.server.log();
        self.middleware.log();

        let stream = &self.service.stream;
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            size_threshold = stream.size_threshold,
            flush_interval_ms = stream.flush_interval_ms,
            heartbeat_interval_ms = stream.heartbeat_interval_ms,
            chunk_size = stream.chunk_size,
            chunk_gap_ms = stream.chunk_gap_ms,
            sink_capacity = stream.sink_capacity,
            wire_format = %stream.wire_format,
            "Stream configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            producer_delay_ms = self.service.producer_delay_ms,
            max_streams = self.service.max_streams,
            "Service configuration"
        );
    }

    fn log_build_info() {
        tracing::info!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            "starting relay server"
        );

        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
