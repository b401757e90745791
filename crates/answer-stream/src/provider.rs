use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::stream::AnswerStream;

/// Stable identifier for a provider implementation (for example `openai`).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ProviderId(pub String);

impl ProviderId {
    /// Creates a provider id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the provider id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Inputs for one `generate_answer` call.
#[derive(Clone, Debug)]
pub struct AnswerParams {
    /// User prompt sent after the provider's system instruction.
    pub prompt: String,
    /// Caller-owned cancellation signal. The provider only observes it.
    pub signal: CancellationToken,
}

impl AnswerParams {
    /// Creates params with a fresh, untriggered signal.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            signal: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation signal.
    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = signal;
        self
    }
}

/// Capability every vendor integration implements to be pluggable.
///
/// A call never fails synchronously: setup, HTTP, and stream failures all
/// arrive as the terminal `AnswerEvent::Error` of the returned stream.
#[async_trait::async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Stable provider id used for registration.
    fn id(&self) -> ProviderId;

    /// Starts streaming an answer for `params.prompt`.
    ///
    /// Resolves once the response headers arrive (or the call fails), then
    /// yields events lazily as the caller polls.
    async fn generate_answer(&self, params: AnswerParams) -> AnswerStream;
}
