use relay_stream::StreamStats;
use serde::{Deserialize, Serialize};

/// Payload of a `delta` event: one fragment of the generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDelta {
    /// Fragment text.
    pub text: String,
    /// Zero-based position of the fragment.
    pub index: usize,
}

/// Payload of the final `done` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDone {
    /// Fragments (or chunks, in chunked mode) handed to the stream.
    pub fragments: usize,
    /// Delivery counters at the time the answer completed.
    pub stats: StreamStats,
}

/// Payload of the `error` event sent when generation fails mid-stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFailure {
    /// Description of the failure.
    pub message: String,
}
