//! Model client factory.
//!
//! Centralizes provider-specific logic for creating clients.

use std::sync::Arc;

use crate::error::{Result, WardenError};
use crate::llm::{
    AnthropicClient, AnthropicConfig, LlmClient, LlmProvider, MockLlmClient, OpenAiClient,
    OpenAiConfig,
};

/// Creates a client for the given provider.
///
/// API keys come from `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` or
/// `GROQ_API_KEY`. The model is `model` when non-empty, otherwise
/// `OPENAI_MODEL` / `ANTHROPIC_MODEL` / `GROQ_MODEL`, otherwise a provider
/// default.
pub fn create_client(provider: LlmProvider, model: Option<&str>) -> Result<Arc<dyn LlmClient>> {
    create_client_with(provider, model, |var| std::env::var(var).ok())
}

fn create_client_with(
    provider: LlmProvider,
    model: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmClient>> {
    let key = |var: &str| {
        env(var).filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            WardenError::config(format!("No API key configured for {provider}. Set {var}."))
        })
    };
    let pick_model = |var: &str, default: &str| {
        model
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or_else(|| env(var))
            .unwrap_or_else(|| default.to_string())
    };

    let client: Arc<dyn LlmClient> = match provider {
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(OpenAiConfig::new(
            key("OPENAI_API_KEY")?,
            pick_model("OPENAI_MODEL", "gpt-4o"),
        ))?),
        LlmProvider::Groq => Arc::new(OpenAiClient::new(OpenAiConfig::groq(
            key("GROQ_API_KEY")?,
            pick_model("GROQ_MODEL", "llama-3.3-70b-versatile"),
        ))?),
        LlmProvider::Anthropic => Arc::new(AnthropicClient::new(AnthropicConfig::new(
            key("ANTHROPIC_API_KEY")?,
            pick_model("ANTHROPIC_MODEL", "claude-sonnet-4-20250514"),
        ))?),
        LlmProvider::Mock => Arc::new(MockLlmClient::new()),
    };
    Ok(client)
}
