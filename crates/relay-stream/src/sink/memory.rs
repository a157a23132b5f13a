//! In-memory sink for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::Sink;
use crate::lock;

/// Sink that records every frame it accepts.
///
/// Writability and connection termination are driven by the test.
#[derive(Debug)]
pub struct MemorySink {
    frames: Mutex<Vec<Bytes>>,
    writable: AtomicBool,
    close_called: AtomicBool,
    closed: CancellationToken,
}

impl MemorySink {
    /// Creates a writable, open sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            writable: AtomicBool::new(true),
            close_called: AtomicBool::new(false),
            closed: CancellationToken::new(),
        })
    }

    /// Returns every accepted frame in append order.
    #[must_use]
    pub fn frames(&self) -> Vec<Bytes> {
        lock(&self.frames).clone()
    }

    /// Returns every accepted frame decoded as UTF-8, lossily.
    #[must_use]
    pub fn frames_utf8(&self) -> Vec<String> {
        lock(&self.frames)
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    /// Returns all accepted bytes concatenated.
    #[must_use]
    pub fn contents(&self) -> Bytes {
        lock(&self.frames).concat().into()
    }

    /// Makes the sink (un)writable without closing it.
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Simulates a client disconnect: the sink stops accepting frames and the
    /// close token fires.
    pub fn disconnect(&self) {
        self.set_writable(false);
        self.closed.cancel();
    }

    /// Fires the close token while the sink keeps accepting frames.
    pub fn signal_close(&self) {
        self.closed.cancel();
    }

    /// Returns `true` if [`Sink::close`] was called by the owner.
    #[must_use]
    pub fn close_called(&self) -> bool {
        self.close_called.load(Ordering::SeqCst)
    }
}

impl Sink for MemorySink {
    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn append(&self, frame: Bytes) -> bool {
        if !self.is_writable() {
            return false;
        }

        lock(&self.frames).push(frame);
        true
    }

    fn close(&self) {
        self.close_called.store(true, Ordering::SeqCst);
        self.set_writable(false);
        self.closed.cancel();
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}
