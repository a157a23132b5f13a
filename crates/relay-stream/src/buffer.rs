//! Coalescing write buffer with a dual size/time flush trigger.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;

use crate::sink::SharedSink;
use crate::stats::StreamCounters;
use crate::{Event, StreamConfig, StreamStats, Timer, WireFormat, lock};

/// Tracing target for buffer operations.
const TRACING_TARGET: &str = "relay_stream::buffer";

/// Accumulates encoded events and hands them to the sink in batches.
///
/// Every [`write`] evaluates the flush policy:
///
/// 1. flush now if the buffered bytes reached the size threshold;
/// 2. flush now if the time threshold elapsed since the last flush;
/// 3. otherwise arm a single deferred flush, unless one is already pending.
///
/// A successful flush cancels the pending deferred flush. Frames reach the
/// sink in the order their events were written.
///
/// [`write`]: StreamBuffer::write
#[derive(Debug)]
pub struct StreamBuffer {
    shared: Arc<BufferShared>,
}

#[derive(Debug)]
struct BufferShared {
    sink: SharedSink,
    format: WireFormat,
    size_threshold: usize,
    flush_interval: Duration,
    counters: Arc<StreamCounters>,
    state: Mutex<BufferState>,
}

#[derive(Debug)]
struct BufferState {
    buf: BytesMut,
    last_flush: Instant,
    pending: Option<PendingFlush>,
    timer_seq: u64,
    ended: bool,
}

#[derive(Debug)]
struct PendingFlush {
    id: u64,
    timer: Timer,
}

impl StreamBuffer {
    /// Creates a buffer in front of `sink` using the thresholds of `config`.
    pub fn new(sink: SharedSink, config: &StreamConfig) -> Self {
        Self::with_counters(sink, config, Arc::default())
    }

    pub(crate) fn with_counters(
        sink: SharedSink,
        config: &StreamConfig,
        counters: Arc<StreamCounters>,
    ) -> Self {
        let state = BufferState {
            buf: BytesMut::with_capacity(config.size_threshold),
            last_flush: Instant::now(),
            pending: None,
            timer_seq: 0,
            ended: false,
        };

        let shared = BufferShared {
            sink,
            format: config.wire_format,
            size_threshold: config.size_threshold,
            flush_interval: config.flush_interval(),
            counters,
            state: Mutex::new(state),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Encodes `event` into the buffer and applies the flush policy.
    ///
    /// Returns `false` without buffering anything if the sink is closed, not
    /// writable, or the buffer has ended.
    pub fn write(&self, event: impl Into<Event>) -> bool {
        let shared = &self.shared;
        let mut state = lock(&shared.state);

        if state.ended {
            tracing::trace!(target: TRACING_TARGET, "Write after end ignored");
            return false;
        }

        if shared.sink.is_closed() || !shared.sink.is_writable() {
            shared.counters.record_rejected_write();
            tracing::trace!(target: TRACING_TARGET, "Sink not writable, write rejected");
            return false;
        }

        event.into().encode(shared.format, &mut state.buf);

        let size_reached = state.buf.len() >= shared.size_threshold;
        let time_reached = state.last_flush.elapsed() >= shared.flush_interval;
        if size_reached || time_reached {
            shared.flush_locked(&mut state);
        }

        if !state.buf.is_empty() && state.pending.is_none() {
            BufferShared::schedule(shared, &mut state);
        }

        true
    }

    /// Writes the whole buffer to the sink as one frame.
    ///
    /// Returns `true` if a frame was delivered. If the sink is not writable
    /// the buffered bytes are kept for a later attempt. A sink that signalled
    /// close but still accepts bytes receives what was buffered before it
    /// closed.
    pub fn flush(&self) -> bool {
        let mut state = lock(&self.shared.state);
        self.shared.flush_locked(&mut state)
    }

    /// Flushes what is left, cancels the deferred flush and stops accepting
    /// writes. Idempotent.
    ///
    /// Bytes the sink can no longer take are discarded, so the buffer is
    /// always empty afterwards.
    pub fn end(&self) {
        let shared = &self.shared;
        let mut state = lock(&shared.state);

        if state.ended {
            return;
        }

        shared.flush_locked(&mut state);

        if let Some(pending) = state.pending.take() {
            pending.timer.cancel();
        }

        if !state.buf.is_empty() {
            let discarded = state.buf.len();
            tracing::warn!(
                target: TRACING_TARGET,
                bytes = discarded,
                "Sink gone before final flush, discarding buffered output"
            );
            shared.counters.record_discard(discarded);
            state.buf.clear();
        }

        state.ended = true;
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.shared.state).buf.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.shared.state).buf.is_empty()
    }

    /// Returns `true` while a deferred flush is armed.
    #[must_use]
    pub fn has_pending_flush(&self) -> bool {
        lock(&self.shared.state).pending.is_some()
    }

    /// Returns when the last successful flush happened.
    ///
    /// Before the first flush this is the creation time of the buffer.
    #[must_use]
    pub fn last_flush(&self) -> Instant {
        lock(&self.shared.state).last_flush
    }

    /// Returns `true` once [`end`](Self::end) has run.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        lock(&self.shared.state).ended
    }

    /// Returns the encoding used for buffered events.
    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.shared.format
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.shared.counters.snapshot()
    }
}

impl BufferShared {
    fn flush_locked(&self, state: &mut BufferState) -> bool {
        if state.buf.is_empty() || !self.sink.is_writable() {
            return false;
        }

        let frame = state.buf.split().freeze();
        let bytes = frame.len();

        if !self.sink.append(frame.clone()) {
            // Put the frame back so a later flush can retry it.
            state.buf.extend_from_slice(&frame);
            tracing::debug!(target: TRACING_TARGET, bytes, "Flush refused by sink, keeping buffer");
            return false;
        }

        self.sink.flush();
        state.last_flush = Instant::now();
        if let Some(pending) = state.pending.take() {
            pending.timer.cancel();
        }

        self.counters.record_flush(bytes);
        tracing::trace!(target: TRACING_TARGET, bytes, "Buffer flushed");
        true
    }

    fn schedule(this: &Arc<Self>, state: &mut BufferState) {
        debug_assert!(!state.ended, "deferred flush scheduled after end");
        if state.ended {
            tracing::error!(target: TRACING_TARGET, "Deferred flush scheduled after end");
            return;
        }

        state.timer_seq += 1;
        let id = state.timer_seq;
        let weak = Arc::downgrade(this);
        let timer = Timer::once(this.flush_interval, move || Self::on_timer(&weak, id));

        state.pending = Some(PendingFlush { id, timer });
    }

    fn on_timer(weak: &Weak<Self>, id: u64) {
        let Some(this) = weak.upgrade() else {
            return;
        };

        let mut state = lock(&this.state);
        if state.pending.as_ref().is_none_or(|pending| pending.id != id) {
            return;
        }

        state.pending = None;
        if state.ended {
            return;
        }

        this.flush_locked(&mut state);

        // Retry while the connection is alive so quiet producers do not stall.
        if !state.buf.is_empty() && !this.sink.is_closed() {
            Self::schedule(&this, &mut state);
        }
    }
}

impl Drop for BufferShared {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(pending) = state.pending.take() {
            pending.timer.cancel();
        }
    }
}
