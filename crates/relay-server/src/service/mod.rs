//! Application state and dependency injection.

mod config;
mod producer;
mod stream;

use std::sync::Arc;

pub use crate::service::config::{ServiceConfig, ServiceConfigBuilder, ServiceConfigBuilderError};
pub use crate::service::producer::{FragmentStream, MockProducer, SharedProducer, TextProducer};
pub use crate::service::stream::StreamService;
pub use crate::{Error, Result};

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection).
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    pub stream_service: StreamService,
    pub text_producer: SharedProducer,
}

impl ServiceState {
    /// Creates application state from its parts.
    pub fn new(stream_service: StreamService, text_producer: SharedProducer) -> Self {
        Self {
            stream_service,
            text_producer,
        }
    }

    /// Initializes application state from configuration, with the
    /// [`MockProducer`] as text source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the stream parameters are invalid.
    pub fn from_config(service_config: &ServiceConfig) -> Result<Self> {
        service_config.validate()?;

        let stream_service =
            StreamService::new(service_config.stream.clone(), service_config.max_streams);
        let text_producer = Arc::new(MockProducer::new(service_config.producer_delay()));

        Ok(Self::new(stream_service, text_producer))
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(stream_service: StreamService);
impl_di!(text_producer: SharedProducer);
