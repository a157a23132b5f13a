//! Response types for HTTP handlers.

mod chat;
mod errors;
mod monitors;
mod stream;

pub use chat::*;
pub use errors::*;
pub use monitors::*;
pub use stream::*;
