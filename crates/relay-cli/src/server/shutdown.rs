//! Graceful shutdown signal handling.

use std::time::Duration;

use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix;
use tokio_util::sync::CancellationToken;

use super::TRACING_TARGET_SHUTDOWN;

/// Waits for a shutdown signal (SIGTERM or SIGINT/Ctrl+C).
///
/// # Arguments
///
/// * `shutdown_timeout` - How long open streams may keep running afterwards
pub async fn shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!(
                target: TRACING_TARGET_SHUTDOWN,
                error = %e,
                "Failed to install Ctrl+C handler"
            );
        } else {
            tracing::info!(
                target: TRACING_TARGET_SHUTDOWN,
                "Received Ctrl+C signal, initiating graceful shutdown"
            );
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                tracing::info!(
                    target: TRACING_TARGET_SHUTDOWN,
                    "Received SIGTERM signal, initiating graceful shutdown"
                );
            }
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET_SHUTDOWN,
                    error = %e,
                    "Failed to install SIGTERM handler"
                );
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!(
        target: TRACING_TARGET_SHUTDOWN,
        timeout_secs = shutdown_timeout.as_secs(),
        "Graceful shutdown initiated"
    );
}

/// Cancels `shutdown` when `signal` resolves, then waits out the drain
/// window for connections that are still open.
///
/// Streams are long-lived, so the server stops waiting for them once
/// `shutdown_timeout` has passed since the signal.
pub async fn drain_deadline<F>(signal: F, shutdown: CancellationToken, shutdown_timeout: Duration)
where
    F: Future<Output = ()>,
{
    signal.await;
    shutdown.cancel();
    tokio::time::sleep(shutdown_timeout).await;

    tracing::warn!(
        target: TRACING_TARGET_SHUTDOWN,
        timeout_secs = shutdown_timeout.as_secs(),
        "Shutdown timeout elapsed, closing remaining connections"
    );
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_then_waits_for_the_timeout() {
        let shutdown = CancellationToken::new();
        let started = tokio::time::Instant::now();

        drain_deadline(ready(()), shutdown.clone(), Duration::from_secs(5)).await;

        assert!(shutdown.is_cancelled());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_waits_for_the_signal() {
        let shutdown = CancellationToken::new();
        let deadline = drain_deadline(
            std::future::pending::<()>(),
            shutdown.clone(),
            Duration::from_secs(1),
        );

        let outcome = tokio::time::timeout(Duration::from_secs(60), deadline).await;
        assert!(outcome.is_err());
        assert!(!shutdown.is_cancelled());
    }
}
