//! Incremental, cancellable answer streams over chat-completion SSE APIs.
//!
//! The crate has two layers. [`sse`] issues a streaming HTTP request and
//! yields complete Server-Sent-Events frames. Vendor adapters under
//! `vendors::*` turn those frames into [`AnswerEvent`]s carrying the
//! cumulative answer text.
//!
//! # Usage (OpenAI)
//!
//! ```no_run
//! use answer_stream::prelude::*;
//! use answer_stream::vendors::openai::OpenAiProvider;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiProvider::from_env()?;
//! let signal = CancellationToken::new();
//!
//! let mut events = provider
//!     .generate_answer(AnswerParams::new("Say hello").signal(signal.clone()))
//!     .await;
//! while let Some(event) = events.next_event().await {
//!     match event {
//!         AnswerEvent::Answer { text, .. } => println!("{text}"),
//!         AnswerEvent::Done => break,
//!         AnswerEvent::Error { error } => return Err(error.into()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Error types for calls and provider setup.
pub mod errors;
/// Provider registry.
pub mod harness;
/// Logging initialisation for binaries.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Provider capability and call parameters.
pub mod provider;
/// Server-Sent-Events transport.
pub mod sse;
/// Per-call answer accumulation.
pub mod state;
/// Normalized public answer events.
pub mod stream;
/// Vendor-specific integrations.
pub mod vendors;

pub use errors::{FrameParseError, HarnessError, StreamError};
pub use harness::{Harness, HarnessBuilder};
pub use provider::{AnswerParams, AnswerProvider, ProviderId};
pub use state::{AnswerState, StreamPhase};
pub use stream::{AnswerEvent, AnswerStream};
