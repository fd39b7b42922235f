pub mod openai;

use std::{
    ops::Deref,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::{
    Stream, StreamExt,
    stream::{BoxStream, FusedStream},
};
use tracing::debug;

use crate::base::{
    error::CompletionError,
    types::{ModelConfig, StreamDelta, Transcript},
};

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This trait defines the core functionality for interacting with large language models.
/// Implementing this trait allows different LLM providers to be used with the thread-bot.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Open a streamed completion over the transcript.
    ///
    /// Implementations do not retry: connection failures surface as
    /// [`CompletionError::Unavailable`], either here or as the first stream item.
    async fn stream_completion(&self, transcript: &Transcript, model: &ModelConfig) -> Result<CompletionStream, CompletionError>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}

/// A single-pass stream of completion deltas.
///
/// Errors are classified here rather than by each provider: a failure before the provider
/// produced any item is [`CompletionError::Unavailable`], anything later is [`CompletionError::Stream`].
/// The underlying provider stream is dropped (releasing its connection) as soon as a terminal
/// delta or an error is seen, or when this value is dropped.
pub struct CompletionStream {
    inner: Option<BoxStream<'static, Result<StreamDelta, CompletionError>>>,
    started: bool,
}

impl CompletionStream {
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<StreamDelta, CompletionError>> + Send + 'static,
    {
        Self {
            inner: Some(inner.boxed()),
            started: false,
        }
    }

    /// Releases the provider stream without consuming the rest of it.
    pub fn close(mut self) {
        if self.inner.take().is_some() {
            debug!("Closed completion stream before it ended.");
        }
    }
}

impl Stream for CompletionStream {
    type Item = Result<StreamDelta, CompletionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(delta))) => {
                this.started = true;

                if delta.is_terminal() {
                    this.inner = None;
                }

                Poll::Ready(Some(Ok(delta)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.inner = None;

                let message = match err {
                    CompletionError::Unavailable(message) | CompletionError::Stream(message) => message,
                };

                let err = if this.started { CompletionError::Stream(message) } else { CompletionError::Unavailable(message) };

                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl FusedStream for CompletionStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn stream_of(items: Vec<Result<StreamDelta, CompletionError>>) -> CompletionStream {
        CompletionStream::new(stream::iter(items))
    }

    #[tokio::test]
    async fn error_before_any_item_is_unavailable() {
        let mut stream = stream_of(vec![Err(CompletionError::Stream("status 500".to_string()))]);

        assert_eq!(stream.next().await, Some(Err(CompletionError::Unavailable("status 500".to_string()))));
        assert!(stream.is_terminated());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn error_after_items_is_stream_error() {
        let mut stream = stream_of(vec![Ok(StreamDelta::text("Par")), Err(CompletionError::Unavailable("reset".to_string())), Ok(StreamDelta::text("never"))]);

        assert_eq!(stream.next().await, Some(Ok(StreamDelta::text("Par"))));
        assert_eq!(stream.next().await, Some(Err(CompletionError::Stream("reset".to_string()))));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn terminal_delta_ends_the_stream() {
        let mut stream = stream_of(vec![Ok(StreamDelta::text("a")), Ok(StreamDelta::finish("stop")), Ok(StreamDelta::text("trailing"))]);

        let items = (&mut stream).collect::<Vec<_>>().await;

        assert_eq!(items, vec![Ok(StreamDelta::text("a")), Ok(StreamDelta::finish("stop"))]);
        assert!(stream.is_terminated());
    }

    #[tokio::test]
    async fn skip_deltas_pass_through() {
        let mut stream = stream_of(vec![Ok(StreamDelta::default()), Ok(StreamDelta::text("a"))]);

        assert_eq!(stream.next().await, Some(Ok(StreamDelta::default())));
        assert_eq!(stream.next().await, Some(Ok(StreamDelta::text("a"))));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn close_drops_the_provider_stream() {
        let dropped = Arc::new(());
        let witness = dropped.clone();
        let inner = stream::iter(vec![Ok(StreamDelta::text("a"))]).map(move |item| {
            let _ = &witness;
            item
        });

        let stream = CompletionStream::new(inner);
        assert_eq!(Arc::strong_count(&dropped), 2);

        stream.close();
        assert_eq!(Arc::strong_count(&dropped), 1);
    }
}
