use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use relay_stream::StreamConfig;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default values for configuration options.
mod defaults {
    /// Delay between words emitted by the mock producer, in milliseconds.
    pub const PRODUCER_DELAY_MS: u64 = 25;

    /// Maximum number of open streams (0 means unlimited).
    pub const MAX_STREAMS: usize = 1024;

    pub fn producer_delay_ms() -> u64 {
        PRODUCER_DELAY_MS
    }

    pub fn max_streams() -> usize {
        MAX_STREAMS
    }
}

/// App [`state`] configuration.
///
/// [`state`]: crate::service::ServiceState
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[builder(
    pattern = "owned",
    setter(prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct ServiceConfig {
    /// Buffering, keepalive and pacing parameters for every stream.
    #[cfg_attr(feature = "config", command(flatten))]
    #[builder(default)]
    #[serde(default)]
    pub stream: StreamConfig,

    /// Delay between words emitted by the mock producer, in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "PRODUCER_DELAY_MS", default_value_t = defaults::PRODUCER_DELAY_MS)
    )]
    #[builder(default = "defaults::PRODUCER_DELAY_MS")]
    #[serde(default = "defaults::producer_delay_ms")]
    pub producer_delay_ms: u64,

    /// Maximum number of streams open at the same time; 0 disables the limit.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "MAX_STREAMS", default_value_t = defaults::MAX_STREAMS)
    )]
    #[builder(default = "defaults::MAX_STREAMS")]
    #[serde(default = "defaults::max_streams")]
    pub max_streams: usize,
}

impl ServiceConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Validates the stream parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        Ok(())
    }

    /// Returns the mock producer delay as a `Duration`.
    #[must_use]
    pub const fn producer_delay(&self) -> Duration {
        Duration::from_millis(self.producer_delay_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            producer_delay_ms: defaults::PRODUCER_DELAY_MS,
            max_streams: defaults::MAX_STREAMS,
        }
    }
}

impl ServiceConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match &self.stream {
            Some(stream) => stream.validate().map_err(|err| err.to_string()),
            None => Ok(()),
        }
    }
}
