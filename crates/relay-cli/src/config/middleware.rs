//! Middleware configuration for the HTTP server.

use clap::Args;
use relay_server::middleware::RecoveryConfig;
use serde::{Deserialize, Serialize};

use super::TRACING_TARGET_CONFIG;

/// Middleware configuration.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Recovery middleware configuration.
    ///
    /// Bounds the time until response headers are sent and recovers from
    /// handler panics.
    #[clap(flatten)]
    pub recovery: RecoveryConfig,
}

impl MiddlewareConfig {
    /// Logs middleware configuration at info level.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            request_timeout_secs = self.recovery.request_timeout,
            "Recovery configuration"
        );
    }
}
