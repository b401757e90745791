use crate::errors::StreamError;
use crate::stream::AnswerEvent;

/// Lifecycle of one streaming call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Failed,
    /// Stopped by the caller's signal; ends without a terminal event.
    Cancelled,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Running answer owned by exactly one call.
///
/// Text only grows, the message id is recorded once, and at most one
/// terminal event is ever produced.
#[derive(Debug, Default)]
pub struct AnswerState {
    text: String,
    message_id: Option<String>,
    phase: StreamPhase,
}

impl AnswerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Marks the connection as open.
    pub fn begin(&mut self) {
        if self.phase == StreamPhase::Idle {
            self.phase = StreamPhase::Streaming;
        }
    }

    /// Records `id` unless one is already known.
    pub fn record_id(&mut self, id: Option<&str>) {
        if self.message_id.is_none()
            && let Some(id) = id.filter(|id| !id.is_empty())
        {
            self.message_id = Some(id.to_string());
        }
    }

    /// Appends a delta and returns the cumulative `Answer` event.
    ///
    /// Empty deltas and deltas after a terminal phase produce nothing.
    pub fn push_delta(&mut self, delta: &str) -> Option<AnswerEvent> {
        if delta.is_empty() || self.is_terminal() {
            return None;
        }
        self.begin();
        self.text.push_str(delta);
        Some(AnswerEvent::Answer {
            text: self.text.clone(),
            message_id: self.message_id.clone(),
            conversation_id: self.message_id.clone(),
        })
    }

    /// Transitions to `Completed`, returning `Done` the first time only.
    pub fn complete(&mut self) -> Option<AnswerEvent> {
        if self.is_terminal() {
            return None;
        }
        self.phase = StreamPhase::Completed;
        Some(AnswerEvent::Done)
    }

    /// Transitions to `Failed`, returning the `Error` event the first time only.
    pub fn fail(&mut self, error: StreamError) -> Option<AnswerEvent> {
        if self.is_terminal() {
            return None;
        }
        self.phase = StreamPhase::Failed;
        Some(AnswerEvent::Error { error })
    }

    /// Transitions to `Cancelled`. Never produces an event.
    pub fn cancel(&mut self) {
        if !self.is_terminal() {
            self.phase = StreamPhase::Cancelled;
        }
    }
}
