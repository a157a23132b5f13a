//! Sink backed by a bounded tokio channel.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::{Sink, TRACING_TARGET};
use crate::lock;

/// Sink that forwards frames into a bounded [`mpsc`] channel.
///
/// The receiving half usually becomes the body of an HTTP response. A full
/// channel makes the sink temporarily unwritable; a dropped receiver (the
/// client went away) terminates it and fires the close token.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: CancellationToken,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or if called outside of a tokio runtime.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let closed = CancellationToken::new();

        // Watches for the receiver going away so the close token fires even
        // when nobody is appending.
        let watcher = sender.clone();
        let token = closed.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = watcher.closed() => {
                    tracing::debug!(target: TRACING_TARGET, "Channel receiver dropped");
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        });

        let sink = Self {
            sender: Mutex::new(Some(sender)),
            closed,
        };

        (Arc::new(sink), receiver)
    }
}

impl Sink for ChannelSink {
    fn is_writable(&self) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }

        lock(&self.sender)
            .as_ref()
            .is_some_and(|sender| !sender.is_closed() && sender.capacity() > 0)
    }

    fn append(&self, frame: Bytes) -> bool {
        let guard = lock(&self.sender);
        let Some(sender) = guard.as_ref() else {
            return false;
        };

        match sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!(target: TRACING_TARGET, "Channel full, frame rejected");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.closed.cancel();
                false
            }
        }
    }

    fn close(&self) {
        if lock(&self.sender).take().is_some() {
            tracing::debug!(target: TRACING_TARGET, "Channel sink closed");
        }
        self.closed.cancel();
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}
