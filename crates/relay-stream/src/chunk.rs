//! Paced delivery of one large payload as a series of partial events.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// One segment of a chunked delivery.
///
/// Serialized as `{"partial":true,"text":"...","index":0}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Marks the event as part of a larger payload.
    pub partial: bool,
    /// Segment text.
    pub text: String,
    /// Zero-based position of the segment in the payload.
    pub index: usize,
}

/// Splits `payload` into ordered segments of at most `chunk_size` characters.
///
/// Segments never split a UTF-8 code point. A payload of `n` characters yields
/// `n.div_ceil(chunk_size)` segments; an empty payload or a zero chunk size
/// yields none.
#[must_use]
pub fn split_chunks(payload: &str, chunk_size: usize) -> Vec<Chunk> {
    if chunk_size == 0 || payload.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(chunk_size)
            .map_or(rest.len(), |(offset, _)| offset);
        let (text, tail) = rest.split_at(end);

        chunks.push(Chunk {
            partial: true,
            text: text.to_owned(),
            index: chunks.len(),
        });
        rest = tail;
    }

    chunks
}

/// Handle to the segments scheduled by a chunked delivery.
///
/// Dropping the handle does not cancel the scheduled segments; each one
/// checks the stream on its own before it is written.
#[derive(Debug)]
#[must_use = "await `wait` to learn how many segments were delivered"]
pub struct ChunkedDelivery {
    handles: Vec<JoinHandle<bool>>,
}

impl ChunkedDelivery {
    pub(crate) fn new(handles: Vec<JoinHandle<bool>>) -> Self {
        Self { handles }
    }

    /// Returns the number of scheduled segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no segment was scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every segment and returns how many reached the sink.
    pub async fn wait(self) -> usize {
        let mut delivered = 0;
        for handle in self.handles {
            if matches!(handle.await, Ok(true)) {
                delivered += 1;
            }
        }
        delivered
    }
}
