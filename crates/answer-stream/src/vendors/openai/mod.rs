//! OpenAI chat-completions provider.
//!
//! Vendor-specific configuration and wire types live here so the root API
//! stays provider-agnostic.
mod adapter;
mod config;
mod wire;

pub use adapter::OpenAiProvider;
pub use config::OpenAiClientConfig;
