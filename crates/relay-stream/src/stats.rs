//! Per-session delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared between a session, its buffer and its heartbeat.
#[derive(Debug, Default)]
pub(crate) struct StreamCounters {
    frames_flushed: AtomicU64,
    bytes_flushed: AtomicU64,
    heartbeats_sent: AtomicU64,
    chunks_sent: AtomicU64,
    chunks_dropped: AtomicU64,
    writes_rejected: AtomicU64,
    bytes_discarded: AtomicU64,
}

impl StreamCounters {
    pub fn record_flush(&self, bytes: usize) {
        self.frames_flushed.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk(&self, delivered: bool) {
        let counter = if delivered {
            &self.chunks_sent
        } else {
            &self.chunks_dropped
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_write(&self) {
        self.writes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self, bytes: usize) {
        self.bytes_discarded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            frames_flushed: self.frames_flushed.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            writes_rejected: self.writes_rejected.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of what a session delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    /// Buffered frames handed to the sink.
    pub frames_flushed: u64,
    /// Total bytes carried by flushed frames.
    pub bytes_flushed: u64,
    /// Keepalive frames written.
    pub heartbeats_sent: u64,
    /// Chunked-delivery segments written.
    pub chunks_sent: u64,
    /// Chunked-delivery segments skipped because the stream was gone.
    pub chunks_dropped: u64,
    /// Writes refused because the sink was not writable.
    pub writes_rejected: u64,
    /// Buffered bytes thrown away when the stream ended on a dead sink.
    pub bytes_discarded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let counters = StreamCounters::default();
        counters.record_flush(10);
        counters.record_flush(5);
        counters.record_heartbeat();
        counters.record_chunk(true);
        counters.record_chunk(false);
        counters.record_rejected_write();

        let stats = counters.snapshot();
        assert_eq!(stats.frames_flushed, 2);
        assert_eq!(stats.bytes_flushed, 15);
        assert_eq!(stats.heartbeats_sent, 1);
        assert_eq!(stats.chunks_sent, 1);
        assert_eq!(stats.chunks_dropped, 1);
        assert_eq!(stats.writes_rejected, 1);
        assert_eq!(stats.bytes_discarded, 0);
    }

    #[test]
    fn stats_serialize_in_camel_case() {
        let json = serde_json::to_value(StreamStats::default()).unwrap();
        assert_eq!(json["framesFlushed"], 0);
        assert_eq!(json["writesRejected"], 0);
    }
}
