use crate::provider::ProviderId;

/// Failure of a single streaming call.
///
/// Delivered to callers as the payload of the terminal
/// `AnswerEvent::Error`. `Cancelled` is the one exception: the transport
/// reports it internally, but the adapter never forwards it as an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Missing or malformed request parameters; raised before any I/O.
    #[error("request setup error: {0}")]
    RequestSetup(String),
    /// The server answered with a non-success status.
    #[error("http error (status {status}): {body}")]
    Http { status: u16, body: String },
    /// Network, decode, or idle-timeout failure after headers were accepted.
    #[error("stream read error: {0}")]
    StreamRead(String),
    /// The vendor reported an error object inside the event stream.
    #[error("provider error: {message}")]
    Provider { message: String },
    /// The event stream ended without a completion marker.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The caller's cancellation token fired.
    #[error("cancelled")]
    Cancelled,
}

impl StreamError {
    pub(crate) fn setup(message: impl Into<String>) -> Self {
        Self::RequestSetup(message.into())
    }

    pub(crate) fn read(message: impl Into<String>) -> Self {
        Self::StreamRead(message.into())
    }

    /// Returns `true` for the silent cancellation variant.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A single frame payload that could not be parsed as JSON.
///
/// Recovered locally: the frame is skipped and the stream continues.
#[derive(Debug, thiserror::Error)]
#[error("invalid JSON frame: {source}")]
pub struct FrameParseError {
    #[from]
    source: serde_json::Error,
}

/// Errors raised while constructing providers or dispatching calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Invalid harness/provider configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Requested provider is not registered in the harness.
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: ProviderId },
}
