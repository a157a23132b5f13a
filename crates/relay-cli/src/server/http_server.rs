//! HTTP server startup and lifecycle management.

use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::serve::ListenerExt;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::shutdown::drain_deadline;
use super::{Result, ServerError, TRACING_TARGET_SHUTDOWN, TRACING_TARGET_STARTUP, shutdown_signal};
use crate::config::ServerConfig;

/// Common server startup logic with graceful shutdown handling.
pub(crate) async fn serve_with_shutdown<F>(
    server_config: &ServerConfig,
    serve_fn: impl FnOnce() -> F,
) -> Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        addr = %server_config.server_addr(),
        "Server is ready and listening for connections"
    );

    if server_config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_STARTUP,
            "Server is bound to all interfaces. Ensure firewall rules are properly configured."
        );
    }

    serve_fn().await.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %err,
            "Server encountered an error"
        );
        ServerError::Runtime(err)
    })?;

    tracing::info!(target: TRACING_TARGET_SHUTDOWN, "Server shut down gracefully");
    Ok(())
}

/// Disables Nagle's algorithm on an accepted connection and, when
/// `keepalive` is set, enables TCP keepalive probes after that idle time.
fn tune_connection(stream: &TcpStream, keepalive: Option<Duration>) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::warn!(
            target: TRACING_TARGET_STARTUP,
            error = %err,
            "Failed to set TCP_NODELAY"
        );
    }

    let Some(idle) = keepalive else {
        return;
    };

    let keepalive = TcpKeepalive::new().with_time(idle);
    if let Err(err) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        tracing::warn!(
            target: TRACING_TARGET_STARTUP,
            error = %err,
            "Failed to set TCP keepalive"
        );
    }
}

/// Starts an HTTP server with graceful shutdown.
///
/// Validates the configuration, binds to the configured address and serves
/// until a shutdown signal arrives. Open streams then get the configured
/// shutdown timeout to finish.
///
/// # Errors
///
/// Returns an error if:
/// - Server configuration is invalid
/// - Cannot bind to the specified address/port
/// - Server encounters a fatal error during operation
pub async fn serve_http(app: Router, server_config: ServerConfig) -> Result<()> {
    if let Err(validation_error) = server_config.validate() {
        tracing::error!(
            target: TRACING_TARGET_STARTUP,
            error = %validation_error,
            "Invalid server configuration"
        );

        return Err(ServerError::invalid_config(&validation_error));
    }

    let server_addr = server_config.server_addr();

    let listener = match TcpListener::bind(server_addr).await {
        Ok(listener) => {
            tracing::info!(
                target: TRACING_TARGET_STARTUP,
                addr = %server_addr,
                "Successfully bound to address"
            );

            listener
        }
        Err(listener_err) => {
            tracing::error!(
                target: TRACING_TARGET_STARTUP,
                addr = %server_addr,
                error = %listener_err,
                "Failed to bind to address"
            );

            return Err(ServerError::bind_error(&server_addr.to_string(), listener_err));
        }
    };

    let keepalive = server_config.tcp_keepalive();
    let listener = listener.tap_io(move |stream| tune_connection(stream, keepalive));
    let shutdown_timeout = server_config.shutdown_timeout();
    let shutdown = CancellationToken::new();

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let deadline = drain_deadline(shutdown_signal(shutdown_timeout), shutdown, shutdown_timeout);

    serve_with_shutdown(&server_config, || async move {
        tokio::select! {
            result = server.into_future() => result,
            () = deadline => Ok(()),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn accepted_pair() -> io::Result<(TcpStream, TcpStream)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let client = TcpStream::connect(listener.local_addr()?).await?;
        let (server, _) = listener.accept().await?;
        Ok((server, client))
    }

    #[tokio::test]
    async fn accepted_connections_get_nodelay_and_keepalive() -> anyhow::Result<()> {
        let (server, _client) = accepted_pair().await?;

        tune_connection(&server, Some(Duration::from_secs(10)));

        assert!(server.nodelay()?);
        assert!(SockRef::from(&server).keepalive()?);
        Ok(())
    }

    #[tokio::test]
    async fn keepalive_can_be_disabled() -> anyhow::Result<()> {
        let (server, _client) = accepted_pair().await?;

        tune_connection(&server, None);

        assert!(server.nodelay()?);
        assert!(!SockRef::from(&server).keepalive()?);
        Ok(())
    }
}
