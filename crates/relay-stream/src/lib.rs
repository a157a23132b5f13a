#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

use std::sync::{Mutex, MutexGuard, PoisonError};

mod buffer;
mod chunk;
mod config;
mod error;
mod event;
mod heartbeat;
mod session;
mod stats;
mod timer;

pub mod sink;

pub use crate::buffer::StreamBuffer;
pub use crate::chunk::{Chunk, ChunkedDelivery, split_chunks};
pub use crate::config::{StreamConfig, StreamConfigBuilder, StreamConfigBuilderError};
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::event::{Event, Payload, WireFormat};
pub use crate::heartbeat::Heartbeat;
pub use crate::session::{EndReason, SessionState, StreamSession};
pub use crate::stats::StreamStats;
pub use crate::timer::Timer;

/// Acquires a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves the guarded state consistent
/// before it can panic, so a poisoned lock is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
