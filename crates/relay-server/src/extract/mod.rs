//! Request extractors with readable rejections.
//!
//! - [`Json`] - JSON deserialization with descriptive error messages
//! - [`ValidateJson`] - JSON extraction followed by `validator` checks

pub mod reject;

pub use crate::extract::reject::{Json, ValidateJson};
