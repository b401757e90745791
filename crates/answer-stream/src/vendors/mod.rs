//! Vendor-specific provider integrations.

/// OpenAI-compatible chat-completions streaming.
pub mod openai;
