use futures::StreamExt as _;
use futures::stream;
use tracing::{debug, warn};

use crate::errors::{HarnessError, StreamError};
use crate::provider::{AnswerParams, AnswerProvider, ProviderId};
use crate::sse::{FrameStream, SseRequest, SseTransport};
use crate::state::AnswerState;
use crate::stream::{AnswerEvent, AnswerStream};

use super::config::OpenAiClientConfig;
use super::wire::{ChatCompletionRequest, FrameOutcome, interpret_frame};

const OPENAI_PROVIDER: &str = "openai";

/// Provider adapter for OpenAI-compatible chat-completions streaming.
#[derive(Debug)]
pub struct OpenAiProvider {
    transport: SseTransport,
    config: OpenAiClientConfig,
}

impl OpenAiProvider {
    /// Creates a provider from explicit client configuration.
    pub fn new(config: OpenAiClientConfig) -> Result<Self, HarnessError> {
        if config.api_key.trim().is_empty() {
            return Err(HarnessError::Config(
                "OpenAI client config api_key must not be empty".into(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(HarnessError::Config(
                "OpenAI client config model must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build OpenAI client: {e}")))?;
        let transport = SseTransport::new(client).idle_timeout(config.idle_timeout);
        Ok(Self { transport, config })
    }

    /// Creates a provider using `OPENAI_API_KEY` and friends.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &OpenAiClientConfig {
        &self.config
    }

    pub(crate) fn build_request(&self, prompt: &str) -> Result<SseRequest, StreamError> {
        if prompt.trim().is_empty() {
            return Err(StreamError::setup("prompt must not be empty"));
        }
        let body = serde_json::to_string(&ChatCompletionRequest::streaming(
            &self.config.model,
            &self.config.system_prompt,
            prompt,
        ))
        .map_err(|e| StreamError::setup(format!("failed to serialize request body: {e}")))?;

        let mut request = SseRequest::post(self.config.chat_completions_url(), body);
        for (name, value) in &self.config.headers {
            request = request.header(name.clone(), value.clone());
        }
        Ok(request
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .header("accept", "text/event-stream"))
    }
}

#[async_trait::async_trait]
impl AnswerProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(OPENAI_PROVIDER)
    }

    async fn generate_answer(&self, params: AnswerParams) -> AnswerStream {
        let call_id = uuid::Uuid::new_v4();
        debug!(call_id = %call_id, model = %self.config.model, "starting chat completion stream");

        let request = match self.build_request(&params.prompt) {
            Ok(request) => request,
            Err(err) => {
                debug!(call_id = %call_id, error = %err, "request setup failed");
                return AnswerStream::failed(call_id, err);
            }
        };

        match self.transport.open(request, params.signal).await {
            Ok(frames) => AnswerStream::new(call_id, answer_events(call_id, frames)),
            Err(StreamError::Cancelled) => {
                debug!(call_id = %call_id, "cancelled before the stream opened");
                AnswerStream::empty(call_id)
            }
            Err(err) => {
                debug!(call_id = %call_id, error = %err, "chat completion request failed");
                AnswerStream::failed(call_id, err)
            }
        }
    }
}

/// Turns a frame stream into answer events, threading one `AnswerState`.
pub(crate) fn answer_events(
    call_id: uuid::Uuid,
    frames: FrameStream,
) -> impl futures::Stream<Item = AnswerEvent> + Send + 'static {
    struct State {
        call_id: uuid::Uuid,
        frames: FrameStream,
        answer: AnswerState,
    }

    let mut answer = AnswerState::new();
    answer.begin();

    stream::unfold(
        State {
            call_id,
            frames,
            answer,
        },
        |mut state| async move {
            loop {
                if state.answer.is_terminal() {
                    return None;
                }

                let event = match state.frames.next().await {
                    Some(Ok(frame)) => match interpret_frame(&mut state.answer, &frame.data) {
                        FrameOutcome::Emit(event) => Some(event),
                        FrameOutcome::Skipped(err) => {
                            warn!(call_id = %state.call_id, error = %err, "skipping malformed frame");
                            continue;
                        }
                        FrameOutcome::Ignored => continue,
                    },
                    Some(Err(StreamError::Cancelled)) => {
                        debug!(call_id = %state.call_id, "stream cancelled by caller");
                        state.answer.cancel();
                        None
                    }
                    Some(Err(err)) => state.answer.fail(err),
                    None => state.answer.fail(StreamError::Protocol(
                        "event stream ended before completion".into(),
                    )),
                };

                match event {
                    Some(event) => {
                        if let AnswerEvent::Error { error } = &event {
                            debug!(call_id = %state.call_id, error = %error, "stream failed");
                        } else if event == AnswerEvent::Done {
                            debug!(call_id = %state.call_id, chars = state.answer.text().len(), "stream completed");
                        }
                        return Some((event, state));
                    }
                    None => return None,
                }
            }
        },
    )
}
