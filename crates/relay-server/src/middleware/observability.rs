//! Request ids, request tracing and sensitive header redaction.

use axum::Router;
use axum::http::header::{self, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

/// Header carrying the request id in both directions.
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Extension trait for `axum::`[`Router`] to apply observability middleware.
pub trait RouterObservabilityExt<S> {
    /// Layers observability middleware for request tracing and logging.
    ///
    /// Every request gets a UUID request id (unless the client sent one),
    /// which is echoed back on the response. `Authorization` and `Cookie`
    /// headers are marked sensitive so they never show up in traces.
    fn with_observability(self) -> Self;
}

impl<S> RouterObservabilityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_observability(self) -> Self {
        self.layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(SetSensitiveRequestHeadersLayer::new([
                header::AUTHORIZATION,
                header::COOKIE,
            ]))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use axum_test::TestServer;

    use super::*;

    #[tokio::test]
    async fn assigns_and_propagates_request_ids() -> anyhow::Result<()> {
        let app = Router::new().route("/", get(|| async { "ok" })).with_observability();
        let server = TestServer::new(app)?;

        let response = server.get("/").await;
        response.assert_status_ok();
        assert!(response.maybe_header("x-request-id").is_some());

        let response = server
            .get("/")
            .add_header("x-request-id", "fixed-id")
            .await;
        assert_eq!(response.header("x-request-id"), "fixed-id");
        Ok(())
    }
}
