//! Periodic keepalive frames.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::WireFormat;
use crate::sink::SharedSink;
use crate::stats::StreamCounters;

/// Tracing target for heartbeat operations.
const TRACING_TARGET: &str = "relay_stream::heartbeat";

/// Recurring keepalive written straight to the sink, bypassing the buffer.
///
/// The emitter stops on its own as soon as the sink is not writable or an
/// append is refused. Dropping the handle stops it as well.
#[derive(Debug)]
pub struct Heartbeat {
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Heartbeat {
    /// Starts writing `format`'s keepalive frame to `sink` every `interval`.
    ///
    /// The first beat is sent one interval after start.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero or if called outside of a tokio runtime.
    pub fn start(sink: SharedSink, format: WireFormat, interval: Duration) -> Self {
        Self::with_counters(sink, format, interval, Arc::default())
    }

    pub(crate) fn with_counters(
        sink: SharedSink,
        format: WireFormat,
        interval: Duration,
        counters: Arc<StreamCounters>,
    ) -> Self {
        let frame = format.keepalive();
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            loop {
                ticker.tick().await;

                if !sink.is_writable() || !sink.append(frame.clone()) {
                    tracing::debug!(target: TRACING_TARGET, "Sink not writable, heartbeat stopped");
                    break;
                }

                sink.flush();
                counters.record_heartbeat();
                tracing::trace!(target: TRACING_TARGET, "Heartbeat sent");
            }
        });

        Self {
            task: Some(task),
            interval,
        }
    }

    /// Stops the keepalive schedule. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Returns `true` while keepalive frames are still being scheduled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Returns the keepalive interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;
    use crate::sink::MemorySink;

    const INTERVAL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn beats_at_the_configured_interval() {
        let sink = MemorySink::new();
        let heartbeat = Heartbeat::start(sink.clone(), WireFormat::Sse, INTERVAL);

        sleep(Duration::from_secs(29)).await;
        assert!(sink.frames().is_empty());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.frames_utf8(), vec![":heartbeat\n\n"]);

        sleep(INTERVAL * 2).await;
        assert_eq!(sink.frames().len(), 3);
        assert!(heartbeat.is_active());
        assert_eq!(heartbeat.interval(), INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_beats() {
        let sink = MemorySink::new();
        let mut heartbeat = Heartbeat::start(sink.clone(), WireFormat::Sse, INTERVAL);

        sleep(INTERVAL + Duration::from_secs(1)).await;
        heartbeat.stop();
        heartbeat.stop();
        assert!(!heartbeat.is_active());

        sleep(INTERVAL * 3).await;
        assert_eq!(sink.frames().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unwritable_sink_terminates_the_emitter() {
        let sink = MemorySink::new();
        let heartbeat = Heartbeat::start(sink.clone(), WireFormat::Raw, INTERVAL);

        sink.set_writable(false);
        sleep(INTERVAL + Duration::from_secs(1)).await;
        assert!(!heartbeat.is_active());

        sink.set_writable(true);
        sleep(INTERVAL * 2).await;
        assert!(sink.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_beats() {
        let sink = MemorySink::new();
        drop(Heartbeat::start(sink.clone(), WireFormat::Sse, INTERVAL));

        sleep(INTERVAL * 2).await;
        assert!(sink.frames().is_empty());
    }
}
