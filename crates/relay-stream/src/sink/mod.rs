//! Outbound stream adapters.
//!
//! A [`Sink`] is the single append-only, closeable byte stream behind one
//! client connection. Everything a session emits ends up in exactly one sink.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

mod channel;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
mod memory;

pub use self::channel::ChannelSink;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub use self::memory::MemorySink;

/// Tracing target for sink operations.
const TRACING_TARGET: &str = "relay_stream::sink";

/// Type alias for a sink shared between a session and its timers.
pub type SharedSink = Arc<dyn Sink>;

/// Append-only outbound stream bound to one connection.
///
/// Implementations never fail loudly: an append that cannot be carried out
/// returns `false` and the caller decides whether to keep the data.
pub trait Sink: fmt::Debug + Send + Sync + 'static {
    /// Returns `true` if the sink can accept an append right now.
    fn is_writable(&self) -> bool;

    /// Appends one frame. Returns `false` if the frame was not accepted.
    fn append(&self, frame: Bytes) -> bool;

    /// Pushes accepted frames to the transport.
    fn flush(&self) {}

    /// Closes the outbound stream. Idempotent.
    fn close(&self);

    /// Returns a token that is cancelled once the connection terminates.
    fn closed(&self) -> CancellationToken;

    /// Returns `true` once the connection has terminated.
    fn is_closed(&self) -> bool {
        self.closed().is_cancelled()
    }
}

/// Runs `callback` once when `sink` reports that its connection terminated.
///
/// The returned handle unregisters the callback when aborted.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime.
pub fn notify_on_close<F>(sink: &dyn Sink, callback: F) -> AbortHandle
where
    F: FnOnce() + Send + 'static,
{
    let closed = sink.closed();
    let task = tokio::spawn(async move {
        closed.cancelled().await;
        tracing::debug!(target: TRACING_TARGET, "Sink close notification fired");
        callback();
    });

    task.abort_handle()
}
