//! Stream delivery configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, WireFormat};

/// Default values for configuration options.
mod defaults {
    /// Flush once this many encoded bytes are buffered.
    pub const SIZE_THRESHOLD: usize = 4096;

    /// Flush at least this often (in milliseconds) while data is buffered.
    pub const FLUSH_INTERVAL_MS: u64 = 50;

    /// Keepalive interval in milliseconds.
    pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

    /// Maximum characters per chunked-delivery segment.
    pub const CHUNK_SIZE: usize = 1024;

    /// Delay step between chunked-delivery segments in milliseconds.
    pub const CHUNK_GAP_MS: u64 = 10;

    /// Number of frames the channel sink holds before reporting backpressure.
    pub const SINK_CAPACITY: usize = 64;

    pub fn size_threshold() -> usize {
        SIZE_THRESHOLD
    }

    pub fn flush_interval_ms() -> u64 {
        FLUSH_INTERVAL_MS
    }

    pub fn heartbeat_interval_ms() -> u64 {
        HEARTBEAT_INTERVAL_MS
    }

    pub fn chunk_size() -> usize {
        CHUNK_SIZE
    }

    pub fn chunk_gap_ms() -> u64 {
        CHUNK_GAP_MS
    }

    pub fn sink_capacity() -> usize {
        SINK_CAPACITY
    }
}

/// Buffering, keepalive and pacing parameters for stream sessions.
///
/// # Environment Variables
///
/// With the `config` feature every field can be set from the command line or
/// the environment:
/// - `STREAM_SIZE_THRESHOLD` - Flush threshold in bytes (default: 4096)
/// - `STREAM_FLUSH_INTERVAL_MS` - Maximum buffering latency (default: 50)
/// - `STREAM_HEARTBEAT_INTERVAL_MS` - Keepalive interval, 0 disables (default: 30000)
/// - `STREAM_CHUNK_SIZE` - Chunked delivery segment size (default: 1024)
/// - `STREAM_CHUNK_GAP_MS` - Delay step between segments (default: 10)
/// - `STREAM_SINK_CAPACITY` - Frames queued before backpressure (default: 64)
/// - `STREAM_WIRE_FORMAT` - `sse` or `raw` (default: sse)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[builder(
    pattern = "owned",
    setter(prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct StreamConfig {
    /// Number of buffered bytes that triggers an immediate flush.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "stream-size-threshold",
            env = "STREAM_SIZE_THRESHOLD",
            default_value_t = defaults::SIZE_THRESHOLD
        )
    )]
    #[builder(default = "defaults::SIZE_THRESHOLD")]
    #[serde(default = "defaults::size_threshold")]
    pub size_threshold: usize,

    /// Maximum time in milliseconds buffered data waits before it is flushed.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "stream-flush-interval-ms",
            env = "STREAM_FLUSH_INTERVAL_MS",
            default_value_t = defaults::FLUSH_INTERVAL_MS
        )
    )]
    #[builder(default = "defaults::FLUSH_INTERVAL_MS")]
    #[serde(default = "defaults::flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Interval in milliseconds between keepalive frames; `0` disables them.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "stream-heartbeat-interval-ms",
            env = "STREAM_HEARTBEAT_INTERVAL_MS",
            default_value_t = defaults::HEARTBEAT_INTERVAL_MS
        )
    )]
    #[builder(default = "defaults::HEARTBEAT_INTERVAL_MS")]
    #[serde(default = "defaults::heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Maximum number of characters per chunked-delivery segment.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "stream-chunk-size",
            env = "STREAM_CHUNK_SIZE",
            default_value_t = defaults::CHUNK_SIZE
        )
    )]
    #[builder(default = "defaults::CHUNK_SIZE")]
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// Delay step in milliseconds between chunked-delivery segments.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "stream-chunk-gap-ms",
            env = "STREAM_CHUNK_GAP_MS",
            default_value_t = defaults::CHUNK_GAP_MS
        )
    )]
    #[builder(default = "defaults::CHUNK_GAP_MS")]
    #[serde(default = "defaults::chunk_gap_ms")]
    pub chunk_gap_ms: u64,

    /// Frames a channel sink queues before it reports itself unwritable.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "stream-sink-capacity",
            env = "STREAM_SINK_CAPACITY",
            default_value_t = defaults::SINK_CAPACITY
        )
    )]
    #[builder(default = "defaults::SINK_CAPACITY")]
    #[serde(default = "defaults::sink_capacity")]
    pub sink_capacity: usize,

    /// Encoding of events and control frames.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "stream-wire-format",
            env = "STREAM_WIRE_FORMAT",
            value_enum,
            default_value_t = WireFormat::Sse
        )
    )]
    #[builder(default)]
    #[serde(default)]
    pub wire_format: WireFormat,
}

impl StreamConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// Returns an invalid configuration error if a threshold, interval,
    /// chunk size or capacity is zero.
    pub fn validate(&self) -> Result<()> {
        check(
            self.size_threshold,
            self.flush_interval_ms,
            self.chunk_size,
            self.sink_capacity,
        )
        .map_err(Error::invalid_config)
    }

    /// Returns the flush time threshold as a `Duration`.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Returns the keepalive interval, or `None` if heartbeats are disabled.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Returns the delay step between chunked-delivery segments.
    #[must_use]
    pub const fn chunk_gap(&self) -> Duration {
        Duration::from_millis(self.chunk_gap_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            size_threshold: defaults::SIZE_THRESHOLD,
            flush_interval_ms: defaults::FLUSH_INTERVAL_MS,
            heartbeat_interval_ms: defaults::HEARTBEAT_INTERVAL_MS,
            chunk_size: defaults::CHUNK_SIZE,
            chunk_gap_ms: defaults::CHUNK_GAP_MS,
            sink_capacity: defaults::SINK_CAPACITY,
            wire_format: WireFormat::default(),
        }
    }
}

impl StreamConfigBuilder {
    /// Wrapper for builder validation that returns String errors.
    fn validate(builder: &StreamConfigBuilder) -> Result<(), String> {
        check(
            builder.size_threshold.unwrap_or(defaults::SIZE_THRESHOLD),
            builder.flush_interval_ms.unwrap_or(defaults::FLUSH_INTERVAL_MS),
            builder.chunk_size.unwrap_or(defaults::CHUNK_SIZE),
            builder.sink_capacity.unwrap_or(defaults::SINK_CAPACITY),
        )
    }
}

fn check(
    size_threshold: usize,
    flush_interval_ms: u64,
    chunk_size: usize,
    sink_capacity: usize,
) -> Result<(), String> {
    if size_threshold == 0 {
        return Err("size threshold must be at least 1 byte".to_owned());
    }

    if flush_interval_ms == 0 {
        return Err("flush interval must be at least 1 millisecond".to_owned());
    }

    if chunk_size == 0 {
        return Err("chunk size must be at least 1 character".to_owned());
    }

    if sink_capacity == 0 {
        return Err("sink capacity must be at least 1 frame".to_owned());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.size_threshold, 4096);
        assert_eq!(config.flush_interval(), Duration::from_millis(50));
        assert_eq!(config.heartbeat_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.wire_format, WireFormat::Sse);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = StreamConfig::builder()
            .with_size_threshold(10)
            .with_flush_interval_ms(1000)
            .with_heartbeat_interval_ms(0)
            .with_wire_format(WireFormat::Raw)
            .build()
            .unwrap();

        assert_eq!(config.size_threshold, 10);
        assert_eq!(config.flush_interval(), Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval(), None);
        assert_eq!(config.chunk_size, 1024);
    }

    #[test]
    fn builder_rejects_zero_thresholds() {
        assert!(StreamConfig::builder().with_size_threshold(0).build().is_err());
        assert!(StreamConfig::builder().with_flush_interval_ms(0).build().is_err());
        assert!(StreamConfig::builder().with_chunk_size(0).build().is_err());
    }

    #[test]
    fn validate_reports_invalid_config_kind() {
        let config = StreamConfig {
            sink_capacity: 0,
            ..StreamConfig::default()
        };

        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::InvalidConfig);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let config: StreamConfig = serde_json::from_str(r#"{ "size_threshold": 128 }"#).unwrap();
        assert_eq!(config.size_threshold, 128);
        assert_eq!(config.flush_interval_ms, 50);
        assert_eq!(config.wire_format, WireFormat::Sse);
    }
}
