//! All `axum::`[`Router`]s with related `axum::`[`Handler`]s.
//!
//! ```rust,no_run
//! use relay_server::handler::routes;
//! use relay_server::service::{ServiceConfig, ServiceState};
//!
//! # fn example() -> anyhow::Result<()> {
//! let state = ServiceState::from_config(&ServiceConfig::default())?;
//! let app: axum::Router = routes().with_state(state);
//! # Ok(())
//! # }
//! ```
//!
//! [`Router`]: axum::routing::Router
//! [`Handler`]: axum::handler::Handler

mod chat;
mod error;
mod monitors;
mod request;
mod response;

use axum::Router;
use axum::http::Uri;

pub use crate::handler::error::{Error, ErrorKind, Result};
pub use crate::handler::request::StreamChat;
pub use crate::handler::response::{
    ErrorResponse, MonitorStatus, ServiceStatus, StreamDelta, StreamDone, StreamFailure,
    StreamResponse,
};
use crate::service::ServiceState;

#[inline]
async fn fallback(uri: Uri) -> Error<'static> {
    ErrorKind::NotFound.with_resource(uri.path().to_owned())
}

/// Returns a [`Router`] with every route of the server.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .merge(chat::routes())
        .merge(monitors::routes())
        .fallback(fallback)
}

#[cfg(test)]
mod test {
    use axum::Router;
    use axum_test::TestServer;

    use crate::handler::routes;
    use crate::service::{ServiceConfig, ServiceState};

    /// Returns a new [`TestServer`] with the given router.
    pub async fn create_test_server_with_router(
        router: impl Fn(ServiceState) -> Router<ServiceState>,
    ) -> anyhow::Result<TestServer> {
        let config = ServiceConfig::default();
        let state = ServiceState::from_config(&config)?;
        let router = router(state.clone());
        create_test_server_with_state(router, state).await
    }

    /// Returns a new [`TestServer`] with the given router and state.
    pub async fn create_test_server_with_state(
        router: Router<ServiceState>,
        state: ServiceState,
    ) -> anyhow::Result<TestServer> {
        let app = router.with_state(state);
        let server = TestServer::new(app)?;
        Ok(server)
    }

    /// Returns a new [`TestServer`] with the default router and state.
    pub async fn create_test_server() -> anyhow::Result<TestServer> {
        create_test_server_with_router(|_| routes()).await
    }

    #[tokio::test]
    async fn handlers() -> anyhow::Result<()> {
        let server = create_test_server().await?;
        assert!(server.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() -> anyhow::Result<()> {
        let server = create_test_server().await?;

        let response = server.get("/missing").expect_failure().await;
        response.assert_status_not_found();
        response.assert_json_contains(&serde_json::json!({
            "name": "not_found",
            "resource": "/missing",
        }));
        Ok(())
    }
}
