//! Per-connection stream session.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tokio::task::AbortHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

use crate::chunk::{Chunk, ChunkedDelivery, split_chunks};
use crate::sink::{SharedSink, notify_on_close};
use crate::stats::StreamCounters;
use crate::{Event, Heartbeat, Result, StreamBuffer, StreamConfig, StreamStats, lock};

/// Tracing target for session lifecycle events.
const TRACING_TARGET: &str = "relay_stream::session";

/// Lifecycle state of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// Created, nothing written to the sink yet.
    Initializing,
    /// Accepting writes.
    Active,
    /// Terminal; every operation is a no-op.
    Ended,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    /// The producer ended the stream.
    Completed,
    /// The connection terminated.
    SinkClosed,
    /// Every handle to the session was dropped.
    Dropped,
}

/// One outbound stream: buffer, heartbeat and lifecycle bound to one sink.
///
/// Handles are cheap to clone and all refer to the same session. When the
/// last handle is dropped the session ends itself.
#[derive(Clone)]
pub struct StreamSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    created_at: Timestamp,
    sink: SharedSink,
    config: StreamConfig,
    counters: Arc<StreamCounters>,
    ended: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    state: SessionState,
    end_reason: Option<EndReason>,
    buffer: Option<StreamBuffer>,
    heartbeat: Option<Heartbeat>,
    close_watch: Option<AbortHandle>,
}

impl StreamSession {
    /// Creates a session in the `initializing` state.
    pub fn new(sink: SharedSink, config: StreamConfig) -> Self {
        let inner = SessionInner {
            id: Uuid::now_v7(),
            created_at: Timestamp::now(),
            sink,
            config,
            counters: Arc::default(),
            ended: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Initializing,
                end_reason: None,
                buffer: None,
                heartbeat: None,
                close_watch: None,
            }),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Activates the session.
    ///
    /// Writes the connection marker, sets up the buffer, starts the heartbeat
    /// and subscribes to the sink's close notification. Returns `false` if the
    /// session was already initialized, or if the sink could not take the
    /// marker, in which case the session ends immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn init(&self) -> bool {
        let inner = &self.inner;
        let mut lifecycle = lock(&inner.lifecycle);

        if lifecycle.state != SessionState::Initializing {
            tracing::warn!(
                target: TRACING_TARGET,
                session_id = %inner.id,
                state = %lifecycle.state,
                "Session initialized twice"
            );
            return false;
        }

        let format = inner.config.wire_format;
        if let Some(ack) = format.connection_ack() {
            if !inner.sink.is_writable() || !inner.sink.append(ack) {
                tracing::debug!(
                    target: TRACING_TARGET,
                    session_id = %inner.id,
                    "Sink not writable during init"
                );
                inner.finish_locked(&mut lifecycle, EndReason::SinkClosed);
                return false;
            }
            inner.sink.flush();
        }

        lifecycle.buffer = Some(StreamBuffer::with_counters(
            inner.sink.clone(),
            &inner.config,
            inner.counters.clone(),
        ));

        lifecycle.heartbeat = inner.config.heartbeat_interval().map(|interval| {
            Heartbeat::with_counters(inner.sink.clone(), format, interval, inner.counters.clone())
        });

        let weak = Arc::downgrade(inner);
        lifecycle.close_watch = Some(notify_on_close(inner.sink.as_ref(), move || {
            SessionInner::on_sink_closed(&weak);
        }));

        lifecycle.state = SessionState::Active;
        tracing::info!(
            target: TRACING_TARGET,
            session_id = %inner.id,
            wire_format = %format,
            heartbeat = lifecycle.heartbeat.is_some(),
            "Stream session started"
        );

        true
    }

    /// Buffers one event for delivery.
    ///
    /// Returns `false` if the session is not active or the sink is closed or
    /// not writable. Callers should drop the event rather than retry.
    pub fn write(&self, event: impl Into<Event>) -> bool {
        let lifecycle = lock(&self.inner.lifecycle);
        match (lifecycle.state, lifecycle.buffer.as_ref()) {
            (SessionState::Active, Some(buffer)) if !self.inner.sink.is_closed() => {
                buffer.write(event)
            }
            _ => false,
        }
    }

    /// Flushes buffered events immediately. Returns `true` if a frame was sent.
    pub fn flush(&self) -> bool {
        let lifecycle = lock(&self.inner.lifecycle);
        match (lifecycle.state, lifecycle.buffer.as_ref()) {
            (SessionState::Active, Some(buffer)) => buffer.flush(),
            _ => false,
        }
    }

    /// Ends the stream: final flush, timers stopped, sink closed.
    ///
    /// Returns `false` if the session had already ended.
    pub fn end(&self) -> bool {
        self.inner.finish(EndReason::Completed)
    }

    /// Writes a final event and ends the stream.
    ///
    /// The final event is best effort; the return value reports whether this
    /// call ended the session.
    pub fn end_with(&self, event: impl Into<Event>) -> bool {
        self.write(event);
        self.end()
    }

    /// Delivers `payload` as paced partial events using the configured
    /// chunk size.
    ///
    /// See [`send_chunked_with`](Self::send_chunked_with).
    pub fn send_chunked(&self, payload: &str) -> Option<ChunkedDelivery> {
        self.send_chunked_with(payload, self.inner.config.chunk_size)
    }

    /// Serializes `payload` to JSON and delivers the resulting text as paced
    /// partial events using the configured chunk size.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `payload` cannot be encoded. Nothing
    /// is scheduled in that case.
    pub fn send_chunked_json<T>(&self, payload: &T) -> Result<Option<ChunkedDelivery>>
    where
        T: Serialize + ?Sized,
    {
        let text = serde_json::to_string(payload)?;
        Ok(self.send_chunked(&text))
    }

    /// Delivers `payload` as paced partial events of at most `chunk_size`
    /// characters, written straight to the sink.
    ///
    /// Segment `i` is sent `i * chunk_gap` after this call. Returns `None` if
    /// the session is not active or the sink is not writable. Segments that
    /// fire after the session ended are dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn send_chunked_with(&self, payload: &str, chunk_size: usize) -> Option<ChunkedDelivery> {
        {
            let lifecycle = lock(&self.inner.lifecycle);
            if lifecycle.state != SessionState::Active
                || self.inner.sink.is_closed()
                || !self.inner.sink.is_writable()
            {
                return None;
            }
        }

        let gap = self.inner.config.chunk_gap();
        let handles = split_chunks(payload, chunk_size)
            .into_iter()
            .map(|chunk| {
                let weak = Arc::downgrade(&self.inner);
                let steps = u32::try_from(chunk.index).unwrap_or(u32::MAX);
                let delay = gap.saturating_mul(steps);

                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    weak.upgrade().is_some_and(|inner| inner.emit_chunk(&chunk))
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            target: TRACING_TARGET,
            session_id = %self.inner.id,
            segments = handles.len(),
            "Chunked delivery scheduled"
        );

        Some(ChunkedDelivery::new(handles))
    }

    /// Returns a future that resolves once the session has ended.
    pub fn ended(&self) -> WaitForCancellationFutureOwned {
        self.inner.ended.clone().cancelled_owned()
    }

    /// Returns `true` once the session has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.is_cancelled()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        lock(&self.inner.lifecycle).state
    }

    /// Returns why the session ended, or `None` while it is still running.
    #[must_use]
    pub fn end_reason(&self) -> Option<EndReason> {
        lock(&self.inner.lifecycle).end_reason
    }

    /// Returns `true` while the session accepts writes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.inner.created_at
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.inner.counters.snapshot()
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("created_at", &self.inner.created_at)
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    fn on_sink_closed(weak: &Weak<Self>) {
        if let Some(inner) = weak.upgrade() {
            inner.finish(EndReason::SinkClosed);
        }
    }

    fn finish(&self, reason: EndReason) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        self.finish_locked(&mut lifecycle, reason)
    }

    fn finish_locked(&self, lifecycle: &mut Lifecycle, reason: EndReason) -> bool {
        if lifecycle.state == SessionState::Ended {
            if reason == EndReason::Completed {
                tracing::warn!(
                    target: TRACING_TARGET,
                    session_id = %self.id,
                    "Session ended twice"
                );
            }
            return false;
        }

        if let Some(buffer) = lifecycle.buffer.take() {
            buffer.end();
        }

        if let Some(mut heartbeat) = lifecycle.heartbeat.take() {
            heartbeat.stop();
        }

        if let Some(close_watch) = lifecycle.close_watch.take() {
            close_watch.abort();
        }

        lifecycle.state = SessionState::Ended;
        lifecycle.end_reason = Some(reason);
        self.sink.close();
        self.ended.cancel();

        let stats = self.counters.snapshot();
        tracing::info!(
            target: TRACING_TARGET,
            session_id = %self.id,
            reason = %reason,
            frames = stats.frames_flushed,
            bytes = stats.bytes_flushed,
            heartbeats = stats.heartbeats_sent,
            chunks = stats.chunks_sent,
            rejected = stats.writes_rejected,
            "Stream session ended"
        );

        true
    }

    fn emit_chunk(&self, chunk: &Chunk) -> bool {
        let lifecycle = lock(&self.lifecycle);

        let delivered = lifecycle.state == SessionState::Active
            && !self.sink.is_closed()
            && self.sink.is_writable()
            && match Event::json(chunk) {
                Ok(event) => self.sink.append(event.to_bytes(self.config.wire_format)),
                Err(error) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        session_id = %self.id,
                        error = %error,
                        "Failed to encode chunk"
                    );
                    false
                }
            };

        if delivered {
            self.sink.flush();
        }

        self.counters.record_chunk(delivered);
        delivered
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let mut lifecycle = lock(&self.lifecycle);
        self.finish_locked(&mut lifecycle, EndReason::Dropped);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::WireFormat;
    use crate::sink::MemorySink;

    const ACK: &str = ":ok\n\n";
    const HEARTBEAT: &str = ":heartbeat\n\n";

    fn config() -> StreamConfig {
        StreamConfig::builder()
            .with_flush_interval_ms(1000)
            .with_heartbeat_interval_ms(30_000)
            .with_chunk_size(3)
            .build()
            .unwrap()
    }

    fn session() -> (Arc<MemorySink>, StreamSession) {
        let sink = MemorySink::new();
        let session = StreamSession::new(sink.clone(), config());
        (sink, session)
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_moves_from_initializing_to_ended() {
        let (sink, session) = session();
        assert_eq!(session.state(), SessionState::Initializing);
        assert!(!session.write("early"));

        assert!(session.init());
        assert!(session.is_active());
        assert_eq!(sink.frames_utf8(), vec![ACK]);

        assert!(session.write("a"));
        assert!(session.end());
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(session.end_reason(), Some(EndReason::Completed));
        assert_eq!(sink.frames_utf8(), vec![ACK, "data: a\n\n"]);
        assert!(sink.close_called());

        assert!(!session.write("late"));
        session.ended().await;
        assert!(session.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn second_init_is_rejected() {
        let (sink, session) = session();
        assert!(session.init());
        assert!(!session.init());
        assert_eq!(sink.frames_utf8(), vec![ACK]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_end_is_rejected() {
        let (_sink, session) = session();
        assert!(session.init());
        assert!(session.end());
        assert!(!session.end());
    }

    #[tokio::test(start_paused = true)]
    async fn close_notification_flushes_pending_writes() {
        let (sink, session) = session();
        assert!(session.init());
        assert!(session.write("a"));
        assert!(session.write("b"));

        sink.signal_close();
        sleep(Duration::from_millis(1)).await;

        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(session.end_reason(), Some(EndReason::SinkClosed));
        assert_eq!(sink.frames_utf8(), vec![ACK, "data: a\n\ndata: b\n\n"]);
        assert_eq!(session.stats().frames_flushed, 1);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.frames().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_after_close_signal_are_rejected() {
        let (sink, session) = session();
        assert!(session.init());

        sink.signal_close();

        assert!(!session.write("after-close"));
        assert!(session.send_chunked("late").is_none());
        assert_eq!(sink.frames_utf8(), vec![ACK]);
    }

    #[tokio::test(start_paused = true)]
    async fn client_disconnect_ends_session_silently() {
        let (sink, session) = session();
        assert!(session.init());
        assert!(session.write("lost"));

        sink.disconnect();
        session.ended().await;

        assert!(!session.write("after"));
        assert_eq!(session.stats().bytes_discarded, "data: lost\n\n".len() as u64);
        assert!(!session.end());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_run_while_active_only() {
        let (sink, session) = session();
        assert!(session.init());

        sleep(Duration::from_secs(31)).await;
        assert_eq!(sink.frames_utf8(), vec![ACK, HEARTBEAT]);

        assert!(session.end());
        sleep(Duration::from_secs(120)).await;
        assert_eq!(session.stats().heartbeats_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_heartbeat() {
        let sink = MemorySink::new();
        let config = StreamConfig::builder()
            .with_heartbeat_interval_ms(0)
            .build()
            .unwrap();
        let session = StreamSession::new(sink.clone(), config);
        assert!(session.init());

        sleep(Duration::from_secs(120)).await;
        assert_eq!(sink.frames_utf8(), vec![ACK]);
    }

    #[tokio::test(start_paused = true)]
    async fn raw_format_skips_the_connection_marker() {
        let sink = MemorySink::new();
        let config = StreamConfig::builder()
            .with_wire_format(WireFormat::Raw)
            .build()
            .unwrap();
        let session = StreamSession::new(sink.clone(), config);

        assert!(session.init());
        assert!(sink.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn init_on_dead_sink_ends_the_session() {
        let (sink, session) = session();
        sink.set_writable(false);

        assert!(!session.init());
        assert!(session.is_ended());
        assert!(session.send_chunked("abc").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn chunked_delivery_emits_indexed_partials() {
        let (sink, session) = session();
        assert!(session.init());

        let delivery = session.send_chunked("abcdefg").unwrap();
        assert_eq!(delivery.len(), 3);
        assert_eq!(delivery.wait().await, 3);

        let frames = sink.frames_utf8();
        let chunks: Vec<Chunk> = frames[1..]
            .iter()
            .map(|frame| {
                let json = frame.strip_prefix("data: ").unwrap().trim_end();
                serde_json::from_str(json).unwrap()
            })
            .collect();

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["abc", "def", "g"]);
        assert!(chunks.iter().enumerate().all(|(i, chunk)| chunk.index == i && chunk.partial));
        assert_eq!(session.stats().chunks_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn json_payloads_are_chunked_as_text() -> Result<()> {
        let sink = MemorySink::new();
        let config = StreamConfig {
            chunk_size: 8,
            ..config()
        };
        let session = StreamSession::new(sink.clone(), config);
        assert!(session.init());

        let payload = serde_json::json!({ "answer": "forty-two" });
        let delivery = session.send_chunked_json(&payload)?.expect("active session");
        assert_eq!(delivery.wait().await, 3);

        let text: String = sink.frames_utf8()[1..]
            .iter()
            .map(|frame| {
                let json = frame.strip_prefix("data: ").unwrap().trim_end();
                serde_json::from_str::<Chunk>(json).unwrap().text
            })
            .collect();
        assert_eq!(text, r#"{"answer":"forty-two"}"#);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_after_end_are_dropped() {
        let (sink, session) = session();
        assert!(session.init());

        let delivery = session.send_chunked_with("abcdef", 2).unwrap();
        sleep(Duration::from_millis(5)).await;
        assert!(session.end());

        assert_eq!(delivery.wait().await, 1);
        assert_eq!(sink.frames().len(), 2);

        let stats = session.stats();
        assert_eq!(stats.chunks_sent, 1);
        assert_eq!(stats.chunks_dropped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn chunked_delivery_requires_active_session() {
        let (_sink, session) = session();
        assert!(session.send_chunked("abc").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn end_with_sends_final_event() {
        let (sink, session) = session();
        assert!(session.init());
        assert!(session.write("x"));
        assert!(session.end_with(Event::text("bye").with_name("done")));

        assert_eq!(
            sink.frames_utf8(),
            vec![ACK, "data: x\n\nevent: done\ndata: bye\n\n"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_last_handle_ends_the_session() {
        let (sink, session) = session();
        assert!(session.init());
        assert!(session.write("x"));

        let clone = session.clone();
        drop(session);
        assert!(!sink.close_called());

        drop(clone);
        assert!(sink.close_called());
        assert_eq!(sink.frames_utf8(), vec![ACK, "data: x\n\n"]);
    }
}
