//! Source of the text that gets streamed to clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};

use crate::{Error, Result};

/// Ordered fragments of one generated answer.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Type alias for a producer shared through the application state.
pub type SharedProducer = Arc<dyn TextProducer>;

/// Turns a prompt into a stream of text fragments.
///
/// Implementations wrap an inference backend. An error returned from
/// [`produce`](Self::produce) fails the request before the stream opens; an
/// error yielded by the stream ends the stream with an `error` event.
#[async_trait]
pub trait TextProducer: Send + Sync + 'static {
    /// Starts generating an answer for `prompt`.
    async fn produce(&self, prompt: &str) -> Result<FragmentStream>;
}

/// Producer that echoes the prompt back one word at a time.
#[derive(Debug, Clone, Default)]
pub struct MockProducer {
    delay: Duration,
}

impl MockProducer {
    /// Creates a producer that waits `delay` before each word.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Returns the delay before each word.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl TextProducer for MockProducer {
    async fn produce(&self, prompt: &str) -> Result<FragmentStream> {
        let delay = self.delay;
        let words = prompt
            .split_inclusive(char::is_whitespace)
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let fragments = stream::iter(words).then(move |word| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, Error>(word)
        });

        Ok(fragments.boxed())
    }
}
