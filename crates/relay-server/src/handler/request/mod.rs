//! Request types for HTTP handlers.

mod chat;

pub use chat::*;
