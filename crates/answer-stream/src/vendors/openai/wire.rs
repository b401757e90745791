//! Chat-completions wire types and per-frame interpretation.

use serde::{Deserialize, Serialize};

use crate::errors::{FrameParseError, StreamError};
use crate::state::AnswerState;
use crate::stream::AnswerEvent;

/// Payload that marks the end of a chat-completions stream.
pub(crate) const DONE_SENTINEL: &str = "[DONE]";
const STOP_FINISH_REASON: &str = "stop";

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> ChatCompletionRequest<'a> {
    pub fn streaming(model: &'a str, system_prompt: &'a str, prompt: &'a str) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        Self {
            model,
            messages,
            stream: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<ChunkError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkError {
    #[serde(default)]
    pub message: Option<String>,
}

/// What one frame did to the call.
#[derive(Debug)]
pub(crate) enum FrameOutcome {
    /// The frame produced an event for the caller.
    Emit(AnswerEvent),
    /// Not valid JSON; skipped, the stream continues.
    Skipped(FrameParseError),
    /// Valid, but carried nothing to publish (role-only delta, keep-alive).
    Ignored,
}

/// Applies one frame payload to `state`.
///
/// Only the first choice is considered.
pub(crate) fn interpret_frame(state: &mut AnswerState, payload: &str) -> FrameOutcome {
    if state.is_terminal() {
        return FrameOutcome::Ignored;
    }
    if payload.trim() == DONE_SENTINEL {
        return emit(state.complete());
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return FrameOutcome::Skipped(FrameParseError::from(e)),
    };
    state.begin();
    state.record_id(chunk.id.as_deref());

    let Some(choice) = chunk.choices.into_iter().next() else {
        if let Some(error) = chunk.error {
            let message = error
                .message
                .unwrap_or_else(|| "provider reported an error".to_string());
            return emit(state.fail(StreamError::Provider { message }));
        }
        return FrameOutcome::Ignored;
    };

    if choice.finish_reason.as_deref() == Some(STOP_FINISH_REASON) {
        return emit(state.complete());
    }
    let delta = choice
        .delta
        .and_then(|delta| delta.content)
        .unwrap_or_default();
    emit(state.push_delta(&delta))
}

fn emit(event: Option<AnswerEvent>) -> FrameOutcome {
    event.map_or(FrameOutcome::Ignored, FrameOutcome::Emit)
}
