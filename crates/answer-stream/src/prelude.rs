//! Common imports for typical usage.
//!
//! Exports the types most callers need to start a call and consume its
//! events.
pub use crate::{
    AnswerEvent, AnswerParams, AnswerProvider, AnswerStream, Harness, HarnessBuilder,
    HarnessError, ProviderId, StreamError,
};
pub use tokio_util::sync::CancellationToken;
