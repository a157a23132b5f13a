//! Opens stream sessions and keeps count of the live ones.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use relay_stream::sink::ChannelSink;
use relay_stream::{StreamConfig, StreamSession};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Tracing target for stream service operations.
const TRACING_TARGET: &str = "relay_server::service::stream";

/// Creates one [`StreamSession`] per request, each bound to its own channel
/// sink, and enforces the open stream limit.
#[derive(Debug, Clone)]
pub struct StreamService {
    config: Arc<StreamConfig>,
    max_streams: usize,
    active: Arc<AtomicUsize>,
}

impl StreamService {
    /// Creates a service using `config` for every session. A `max_streams` of
    /// zero means no limit.
    pub fn new(config: StreamConfig, max_streams: usize) -> Self {
        Self {
            config: Arc::new(config),
            max_streams,
            active: Arc::default(),
        }
    }

    /// Opens a new session and returns it with the receiver that drains its
    /// sink. The session is not initialized yet.
    ///
    /// # Errors
    ///
    /// Returns a capacity error if the open stream limit is reached.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn open(&self) -> Result<(StreamSession, mpsc::Receiver<Bytes>)> {
        let max_streams = self.max_streams;
        let reserved = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (max_streams == 0 || active < max_streams).then_some(active + 1)
            });

        if let Err(active) = reserved {
            tracing::warn!(
                target: TRACING_TARGET,
                active_streams = active,
                max_streams,
                "Stream limit reached"
            );
            return Err(Error::capacity(format!(
                "limit of {max_streams} open streams reached"
            )));
        }

        let (sink, receiver) = ChannelSink::channel(self.config.sink_capacity);
        let session = StreamSession::new(sink, StreamConfig::clone(&self.config));

        let ended = session.ended();
        let active = self.active.clone();
        let session_id = session.id();
        tokio::spawn(async move {
            ended.await;
            let remaining = active.fetch_sub(1, Ordering::AcqRel) - 1;
            tracing::debug!(
                target: TRACING_TARGET,
                session_id = %session_id,
                active_streams = remaining,
                "Stream released"
            );
        });

        Ok((session, receiver))
    }

    /// Returns the number of sessions that have not ended yet.
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Returns `true` if no more streams can be opened right now.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.max_streams != 0 && self.active_streams() >= self.max_streams
    }

    /// Returns the configuration applied to new sessions.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}
