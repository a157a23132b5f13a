//! HTTP server startup with graceful shutdown.
//!
//! Accepted connections have `TCP_NODELAY` set so small frames leave the
//! socket as soon as the stream buffer flushes them.

/// Tracing target for server startup events.
pub const TRACING_TARGET_STARTUP: &str = "relay_cli::server::startup";

/// Tracing target for server shutdown events.
pub const TRACING_TARGET_SHUTDOWN: &str = "relay_cli::server::shutdown";

mod error;
mod http_server;
mod shutdown;

use axum::Router;
pub use error::{ServerError, ServerResult as Result};
use http_server::serve_http;
use shutdown::shutdown_signal;

use crate::config::ServerConfig;

/// Starts the HTTP server and runs it until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if:
/// - Server configuration is invalid
/// - Cannot bind to the specified address/port
/// - Server encounters a fatal error during operation
pub async fn serve(app: Router, config: ServerConfig) -> Result<()> {
    serve_http(app, config).await.inspect_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_STARTUP,
            error = %err,
            error_code = err.error_code(),
            recoverable = err.is_recoverable(),
            suggestion = err.suggestion(),
            "Server failed"
        );
    })
}
