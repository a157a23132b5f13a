use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Overall health reported by `GET /health`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceStatus {
    /// Accepting new streams.
    #[default]
    Healthy,
    /// Running, but the stream limit is reached.
    Degraded,
}

/// Health check response.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    /// When the status was computed.
    pub checked_at: Timestamp,
    /// Overall service status.
    pub status: ServiceStatus,
    /// Server version.
    pub version: String,
    /// Number of streams currently open.
    pub active_streams: usize,
}

impl MonitorStatus {
    /// Creates a status snapshot for the running build.
    pub fn new(status: ServiceStatus, active_streams: usize) -> Self {
        Self {
            checked_at: Timestamp::now(),
            status,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            active_streams,
        }
    }
}
