//! Long-lived streaming response backed by a session's channel sink.
//!
//! The body ends when the session closes its sink, so the transport's own
//! end-of-stream marks the end of the event stream.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use relay_stream::WireFormat;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Forbids every cache between the server and the client from holding frames.
const CACHE_CONTROL: &str = "no-cache, no-transform, no-store, must-revalidate";

/// Disables response buffering in nginx-style reverse proxies.
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Long-lived streaming response whose body is fed by a channel sink.
///
/// The body ends once every sender of the channel is gone, that is when the
/// stream session closes its sink. Dropping the body (client disconnect)
/// drops the receiver, which the sink reports as a closed connection.
#[must_use = "responses do nothing unless returned from a handler"]
#[derive(Debug)]
pub struct StreamResponse {
    receiver: mpsc::Receiver<Bytes>,
    format: WireFormat,
}

impl StreamResponse {
    /// Creates a response draining `receiver`, labelled for `format`.
    pub fn new(receiver: mpsc::Receiver<Bytes>, format: WireFormat) -> Self {
        Self { receiver, format }
    }

    /// Returns the wire format announced in `Content-Type`.
    #[must_use]
    pub const fn format(&self) -> WireFormat {
        self.format
    }
}

impl IntoResponse for StreamResponse {
    fn into_response(self) -> Response {
        let frames = ReceiverStream::new(self.receiver).map(Ok::<_, Infallible>);

        let headers = [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(self.format.content_type()),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL)),
            (X_ACCEL_BUFFERING, HeaderValue::from_static("no")),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ];

        (StatusCode::OK, headers, Body::from_stream(frames)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sets_streaming_headers() {
        let (_sender, receiver) = mpsc::channel::<Bytes>(1);
        let response = StreamResponse::new(receiver, WireFormat::Sse).into_response();

        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], CACHE_CONTROL);
        assert_eq!(headers["x-accel-buffering"], "no");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn body_ends_when_the_sender_is_dropped() {
        let (sender, receiver) = mpsc::channel::<Bytes>(4);
        sender.send(Bytes::from_static(b":ok\n\n")).await.unwrap();
        sender.send(Bytes::from_static(b"data: hi\n\n")).await.unwrap();
        drop(sender);

        let response = StreamResponse::new(receiver, WireFormat::Raw).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&body[..], b":ok\n\ndata: hi\n\n");
    }
}
