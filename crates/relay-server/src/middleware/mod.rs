//! Middleware for `axum::Router`.
//!
//! - [`RouterObservabilityExt`]: request ids, request tracing and redaction
//!   of sensitive headers.
//! - [`RouterRecoveryExt`]: panic recovery, request timeouts and conversion
//!   of middleware errors into JSON error responses.
//!
//! ```rust,no_run
//! use axum::Router;
//! use relay_server::middleware::{RecoveryConfig, RouterObservabilityExt, RouterRecoveryExt};
//!
//! let app: Router = Router::new()
//!     .with_observability()
//!     .with_recovery(&RecoveryConfig::default());
//! ```

mod observability;
mod recovery;

pub use observability::RouterObservabilityExt;
pub use recovery::{RecoveryConfig, RouterRecoveryExt};
