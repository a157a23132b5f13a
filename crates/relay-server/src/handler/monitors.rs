//! Health check handler.

use axum::Router;
use axum::extract::State;
use axum::routing::get;

use crate::extract::Json;
use crate::handler::response::{MonitorStatus, ServiceStatus};
use crate::service::{ServiceState, StreamService};

/// Tracing target for monitor operations.
const TRACING_TARGET: &str = "relay_server::handler::monitors";

/// Reports service status and the number of open streams.
#[tracing::instrument(skip_all)]
async fn health_status(State(stream_service): State<StreamService>) -> Json<MonitorStatus> {
    let status = if stream_service.is_saturated() {
        ServiceStatus::Degraded
    } else {
        ServiceStatus::Healthy
    };

    let response = MonitorStatus::new(status, stream_service.active_streams());

    tracing::debug!(
        target: TRACING_TARGET,
        status = %response.status,
        active_streams = response.active_streams,
        "Health status checked"
    );

    Json(response)
}

/// Returns a [`Router`] with all health monitoring routes.
pub fn routes() -> Router<ServiceState> {
    Router::new().route("/health", get(health_status))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jiff::{Timestamp, ToSpan};
    use relay_stream::StreamConfig;

    use super::*;
    use crate::handler::test::{create_test_server_with_router, create_test_server_with_state};
    use crate::service::MockProducer;

    #[tokio::test]
    async fn reports_healthy_without_streams() -> anyhow::Result<()> {
        let server = create_test_server_with_router(|_| routes()).await?;

        let response = server.get("/health").await;
        response.assert_status_ok();

        let status = response.json::<MonitorStatus>();
        assert_eq!(status.status, ServiceStatus::Healthy);
        assert_eq!(status.active_streams, 0);
        assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
        assert!(status.checked_at > Timestamp::now() - 1.minute());
        Ok(())
    }

    #[tokio::test]
    async fn reports_degraded_at_the_stream_limit() -> anyhow::Result<()> {
        let stream_service = StreamService::new(StreamConfig::default(), 1);
        let state = ServiceState::new(stream_service.clone(), Arc::new(MockProducer::default()));
        let server = create_test_server_with_state(routes(), state).await?;

        let (session, _receiver) = stream_service.open()?;

        let status = server.get("/health").await.json::<MonitorStatus>();
        assert_eq!(status.status, ServiceStatus::Degraded);
        assert_eq!(status.active_streams, 1);

        drop(session);
        Ok(())
    }
}
