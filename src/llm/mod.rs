//! Model integration.
//!
//! Clients for the supported chat model providers, prompt construction,
//! response parsing and the [`SqlGenerator`] built on top of them.

pub mod anthropic;
pub mod factory;
pub mod generator;
pub mod mock;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use factory::create_client;
pub use generator::{LlmSqlGenerator, SqlGenerator};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use parser::{parse_llm_response, GeneratedSql};
pub use prompt::{build_messages, build_system_prompt, OperationHint};
pub use types::{Message, Role};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::{Result, WardenError};

/// A chat model that turns a message list into a reply.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the complete reply as a single string.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
    /// Groq's OpenAI-compatible API
    Groq,
    /// Deterministic offline client (no API key required)
    Mock,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Groq => "groq",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = WardenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "groq" => Ok(Self::Groq),
            "mock" => Ok(Self::Mock),
            _ => Err(WardenError::config(format!("Unknown LLM provider: {s}"))),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
