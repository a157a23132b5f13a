//! End-to-end streaming through the full middleware stack.

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use relay_server::handler::{StreamDone, routes};
use relay_server::middleware::{RecoveryConfig, RouterObservabilityExt, RouterRecoveryExt};
use relay_server::service::{MockProducer, ServiceConfig, ServiceState, StreamService};
use relay_stream::StreamConfig;
use serde_json::json;

fn app(state: ServiceState) -> Router {
    routes()
        .with_state(state)
        .with_observability()
        .with_recovery(&RecoveryConfig::default())
}

fn done_payload(body: &str) -> StreamDone {
    let start = body.rfind("event: done\n").expect("done event");
    let data = body[start..]
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("done data");
    serde_json::from_str(data).expect("done payload")
}

#[tokio::test]
async fn stream_over_http_transport() -> anyhow::Result<()> {
    let config = ServiceConfig::builder().with_producer_delay_ms(5).build()?;
    let state = ServiceState::from_config(&config)?;
    let server = TestServer::builder().http_transport().build(app(state))?;

    let response = server
        .post("/chat/stream")
        .json(&json!({ "prompt": "the quick brown fox" }))
        .await;

    response.assert_status_ok();
    assert!(response.maybe_header("x-request-id").is_some());
    assert_eq!(response.header("content-type"), "text/event-stream");

    let body = response.text();
    assert!(body.starts_with(":ok\n\n"));
    assert_eq!(body.matches("event: delta\n").count(), 4);

    let done = done_payload(&body);
    assert_eq!(done.fragments, 4);
    assert_eq!(done.stats.writes_rejected, 0);
    Ok(())
}

#[tokio::test]
async fn idle_streams_receive_heartbeats() -> anyhow::Result<()> {
    let stream = StreamConfig {
        heartbeat_interval_ms: 20,
        ..StreamConfig::default()
    };
    let state = ServiceState::new(
        StreamService::new(stream, 0),
        Arc::new(MockProducer::new(std::time::Duration::from_millis(60))),
    );
    let server = TestServer::new(app(state))?;

    let response = server
        .post("/chat/stream")
        .json(&json!({ "prompt": "slow answer" }))
        .await;

    response.assert_status_ok();

    let body = response.text();
    assert!(body.contains(":heartbeat\n\n"));
    assert!(done_payload(&body).stats.heartbeats_sent >= 1);
    Ok(())
}

#[tokio::test]
async fn small_fragments_are_coalesced() -> anyhow::Result<()> {
    let state = ServiceState::new(
        StreamService::new(StreamConfig::default(), 0),
        Arc::new(MockProducer::default()),
    );
    let server = TestServer::new(app(state))?;

    let prompt = "a ".repeat(50);
    let response = server
        .post("/chat/stream")
        .json(&json!({ "prompt": prompt }))
        .await;

    let body = response.text();
    assert_eq!(body.matches("event: delta\n").count(), 50);

    // Fifty fragments produced without delay fit under the size threshold,
    // so they leave the buffer in far fewer frames than events.
    let done = done_payload(&body);
    assert!(done.stats.frames_flushed < 50);
    Ok(())
}

#[tokio::test]
async fn health_is_served_through_middleware() -> anyhow::Result<()> {
    let state = ServiceState::from_config(&ServiceConfig::default())?;
    let server = TestServer::new(app(state))?;

    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json_contains(&json!({ "status": "healthy", "activeStreams": 0 }));
    assert!(response.maybe_header("x-request-id").is_some());
    Ok(())
}
