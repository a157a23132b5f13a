//! Streaming chat handler.
//!
//! `POST /chat/stream` relays the producer output to the client over one
//! long-lived response. Fragments are sent as `delta` events through the
//! session buffer, so bursts of small fragments share a frame. In chunked
//! mode the full answer is collected first and delivered as paced `partial`
//! events. Every stream finishes with a `done` event, or an `error` event if
//! the producer fails mid-stream. Clients cancel generation by closing the
//! connection.

use axum::Router;
use axum::extract::State;
use axum::routing::post;
use futures::{StreamExt, TryStreamExt};
use relay_stream::{Event, StreamSession};
use serde::Serialize;

use crate::extract::ValidateJson;
use crate::handler::request::StreamChat;
use crate::handler::response::{StreamDelta, StreamDone, StreamFailure, StreamResponse};
use crate::handler::{ErrorKind, Result};
use crate::service::{FragmentStream, ServiceState, SharedProducer, StreamService};

/// Tracing target for chat streaming operations.
const TRACING_TARGET: &str = "relay_server::handler::chat";

/// Starts a stream for the given prompt.
#[tracing::instrument(skip_all, fields(chunked = request.chunked))]
async fn stream_chat(
    State(stream_service): State<StreamService>,
    State(text_producer): State<SharedProducer>,
    ValidateJson(request): ValidateJson<StreamChat>,
) -> Result<StreamResponse> {
    tracing::debug!(target: TRACING_TARGET, "Starting chat stream");

    let fragments = text_producer.produce(&request.prompt).await.map_err(|err| {
        tracing::error!(target: TRACING_TARGET, error = %err, "Failed to start producer");
        err
    })?;

    let (session, receiver) = stream_service.open()?;
    if !session.init() {
        return Err(ErrorKind::InternalServerError
            .with_message("Failed to open the stream")
            .with_context(format!("session {} could not be initialized", session.id())));
    }

    let response = StreamResponse::new(receiver, session.config().wire_format);

    tracing::info!(
        target: TRACING_TARGET,
        session_id = %session.id(),
        "Chat stream started"
    );

    if request.chunked {
        tokio::spawn(relay_chunked(session, fragments));
    } else {
        tokio::spawn(relay_fragments(session, fragments));
    }

    Ok(response)
}

/// Writes each fragment as a `delta` event until the producer finishes or
/// the session ends.
async fn relay_fragments(session: StreamSession, mut fragments: FragmentStream) {
    let mut index = 0;

    loop {
        let next = tokio::select! {
            () = session.ended() => {
                tracing::info!(
                    target: TRACING_TARGET,
                    session_id = %session.id(),
                    fragments = index,
                    "Client disconnected, cancelling generation"
                );
                return;
            }
            next = fragments.next() => next,
        };

        let text = match next {
            Some(Ok(text)) => text,
            Some(Err(err)) => {
                fail(&session, &err);
                return;
            }
            None => break,
        };

        let delta = StreamDelta { text, index };
        index += 1;

        let event = match Event::json(&delta) {
            Ok(event) => event.with_name("delta"),
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    session_id = %session.id(),
                    error = %err,
                    "Failed to encode fragment"
                );
                continue;
            }
        };

        if !session.write(event) {
            if session.is_ended() {
                return;
            }

            tracing::debug!(
                target: TRACING_TARGET,
                session_id = %session.id(),
                index = delta.index,
                "Stream not writable, fragment dropped"
            );
        }
    }

    let done = StreamDone {
        fragments: index,
        stats: session.stats(),
    };
    finish(&session, "done", &done);
}

/// Collects the whole answer, then delivers it through chunked delivery.
async fn relay_chunked(session: StreamSession, fragments: FragmentStream) {
    let answer = tokio::select! {
        () = session.ended() => return,
        answer = fragments.try_collect::<Vec<String>>() => answer,
    };

    let answer = match answer {
        Ok(parts) => parts.concat(),
        Err(err) => {
            fail(&session, &err);
            return;
        }
    };

    let Some(delivery) = session.send_chunked(&answer) else {
        tracing::debug!(
            target: TRACING_TARGET,
            session_id = %session.id(),
            "Stream not writable, chunked delivery skipped"
        );
        session.end();
        return;
    };

    let scheduled = delivery.len();
    let delivered = delivery.wait().await;

    tracing::debug!(
        target: TRACING_TARGET,
        session_id = %session.id(),
        scheduled,
        delivered,
        "Chunked delivery finished"
    );

    let done = StreamDone {
        fragments: delivered,
        stats: session.stats(),
    };
    finish(&session, "done", &done);
}

/// Ends the stream with an `error` event describing `err`.
fn fail(session: &StreamSession, err: &crate::Error) {
    tracing::error!(
        target: TRACING_TARGET,
        session_id = %session.id(),
        error = %err,
        "Producer failed mid-stream"
    );

    let failure = StreamFailure {
        message: err.message().to_owned(),
    };
    finish(session, "error", &failure);
}

/// Ends the stream with one final named event.
fn finish<T: Serialize>(session: &StreamSession, name: &'static str, payload: &T) {
    match Event::json(payload) {
        Ok(event) => {
            session.end_with(event.with_name(name));
        }
        Err(err) => {
            tracing::error!(
                target: TRACING_TARGET,
                session_id = %session.id(),
                error = %err,
                "Failed to encode final event"
            );
            session.end();
        }
    }
}

/// Returns a [`Router`] with all chat streaming routes.
pub fn routes() -> Router<ServiceState> {
    Router::new().route("/chat/stream", post(stream_chat))
}
