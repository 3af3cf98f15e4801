//! Anthropic messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, WardenError};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Generated SQL is short; this leaves room for the explanation.
const DEFAULT_MAX_TOKENS: u32 = 1024;

const MAX_RETRY_ATTEMPTS: u32 = 3;

const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Anthropic client configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Anthropic client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WardenError::generation(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Splits out the system message, which Anthropic takes as a separate
    /// parameter.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system = None;
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system = Some(msg.content.clone()),
                Role::User | Role::Assistant => converted.push(AnthropicMessage {
                    role: msg.role.as_str().to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        (system, converted)
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: reqwest::StatusCode, body: &str) -> (WardenError, bool) {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                WardenError::generation("Authentication failed. Check your ANTHROPIC_API_KEY."),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (WardenError::generation("Anthropic rate limited the request"), true);
        }

        // 529 is Anthropic's "overloaded"
        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<AnthropicErrorResponse>(body) {
            return (
                WardenError::generation(format!(
                    "Anthropic API error: {}",
                    error_response.error.message
                )),
                is_retryable,
            );
        }

        (
            WardenError::generation(format!("Anthropic API error ({status}): {body}")),
            is_retryable,
        )
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let (system, messages) = Self::convert_messages(messages);
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system,
            messages,
        };

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(provider = "Anthropic", attempt, "Sending completion request");

            let result = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        WardenError::generation(format!("Failed to read response: {e}"))
                    })?;

                    if status.is_success() {
                        let response: AnthropicResponse =
                            serde_json::from_str(&body).map_err(|e| {
                                WardenError::generation(format!("Failed to parse response: {e}"))
                            })?;

                        let text: String = response
                            .content
                            .into_iter()
                            .filter(|block| block.content_type == "text")
                            .map(|block| block.text)
                            .collect();

                        if text.is_empty() {
                            return Err(WardenError::generation("No response from Anthropic"));
                        }
                        return Ok(text);
                    }

                    let (error, is_retryable) = Self::parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(attempt, %status, "Anthropic request failed, retrying in {delay:?}");
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    last_error = Some(WardenError::generation(format!(
                        "Failed to reach Anthropic: {e}"
                    )));

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(attempt, "Anthropic request error, retrying in {delay:?}: {e}");
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error.unwrap_or_else(|| WardenError::generation("Anthropic request failed")))
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    message: String,
}
