//! Service layer error types.
//!
//! Errors raised while building application state, opening streams or
//! starting a producer. Handlers convert them into HTTP errors.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// Type alias for boxed errors that are Send + Sync.
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Result type alias for service layer operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error kind enumeration for categorizing service layer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration-related errors.
    Config,
    /// The service cannot take more streams right now.
    Capacity,
    /// The text producer failed.
    Producer,
    /// Internal service logic errors.
    Internal,
}

impl ErrorKind {
    /// Returns the error kind as a string for categorization.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Capacity => "capacity",
            Self::Producer => "producer",
            Self::Internal => "internal_service",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service layer error with structured information.
#[derive(Debug, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    #[source]
    source: Option<BoxedError>,
}

impl Error {
    #[inline]
    fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches a source error to this error.
    #[inline]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    #[must_use]
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Creates a new configuration error.
    #[inline]
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Creates a new capacity error.
    #[inline]
    pub fn capacity(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Capacity, message)
    }

    /// Creates a new producer error.
    #[inline]
    pub fn producer(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Producer, message)
    }

    /// Creates a new internal service error.
    #[inline]
    pub fn internal(
        service: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        let service_name = service.into();
        let msg = message.into();
        Self::new(ErrorKind::Internal, format!("{service_name}: {msg}"))
    }
}

impl From<relay_stream::Error> for Error {
    fn from(err: relay_stream::Error) -> Self {
        match err.kind() {
            relay_stream::ErrorKind::InvalidConfig => {
                Error::config(err.message().to_owned()).with_source(err)
            }
            relay_stream::ErrorKind::Serialization => {
                Error::internal("stream", err.message().to_owned()).with_source(err)
            }
        }
    }
}
