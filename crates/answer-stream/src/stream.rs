use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt as _};

use crate::errors::StreamError;

/// Normalized events exposed by `AnswerStream`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerEvent {
    /// Cumulative answer text so far (not a delta).
    Answer {
        text: String,
        message_id: Option<String>,
        conversation_id: Option<String>,
    },
    /// Terminal success event.
    Done,
    /// Terminal failure event.
    Error { error: StreamError },
}

impl AnswerEvent {
    /// Returns `true` for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

type EventStream = Pin<Box<dyn Stream<Item = AnswerEvent> + Send + 'static>>;

/// Event sequence returned by `AnswerProvider::generate_answer`.
///
/// Ends after exactly one terminal event, or silently when the caller's
/// cancellation signal fires. Dropping it releases the underlying
/// connection.
pub struct AnswerStream {
    call_id: uuid::Uuid,
    inner: EventStream,
    finished: bool,
}

impl AnswerStream {
    /// Wraps an event stream produced by a provider.
    pub fn new<S>(call_id: uuid::Uuid, events: S) -> Self
    where
        S: Stream<Item = AnswerEvent> + Send + 'static,
    {
        Self {
            call_id,
            inner: Box::pin(events),
            finished: false,
        }
    }

    /// Stream that yields a single terminal error.
    pub fn failed(call_id: uuid::Uuid, error: StreamError) -> Self {
        Self::new(
            call_id,
            futures::stream::once(futures::future::ready(AnswerEvent::Error { error })),
        )
    }

    /// Stream that ends without any event (cancelled before it started).
    pub fn empty(call_id: uuid::Uuid) -> Self {
        Self::new(call_id, futures::stream::empty())
    }

    /// Identifier used in log records for this call.
    pub fn call_id(&self) -> uuid::Uuid {
        self.call_id
    }

    /// Waits for and returns the next event, or `None` once the stream ended.
    pub async fn next_event(&mut self) -> Option<AnswerEvent> {
        self.next().await
    }

    /// Drains the stream and returns the final answer text.
    ///
    /// Returns the error of a terminal `Error` event, and
    /// `StreamError::Cancelled` when the stream ended without a terminal
    /// event.
    pub async fn collect_text(mut self) -> Result<String, StreamError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                AnswerEvent::Answer { text: cumulative, .. } => text = cumulative,
                AnswerEvent::Done => return Ok(text),
                AnswerEvent::Error { error } => return Err(error),
            }
        }
        Err(StreamError::Cancelled)
    }
}

impl Stream for AnswerStream {
    type Item = AnswerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let polled = self.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(Some(event)) if event.is_terminal() => self.finished = true,
            Poll::Ready(None) => self.finished = true,
            _ => {}
        }
        polled
    }
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("call_id", &self.call_id)
            .field("finished", &self.finished)
            .finish()
    }
}
