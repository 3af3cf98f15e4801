//! OpenAI-compatible chat completions client.
//!
//! Serves both OpenAI and Groq, which exposes the same API at a different
//! base URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, WardenError};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// OpenAI API endpoint.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Groq's OpenAI-compatible endpoint.
pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Maximum number of attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Chat completions endpoint.
    pub base_url: String,
    /// Provider name used in error messages.
    pub provider: &'static str,
    /// Environment variable the key is read from, named in auth errors.
    pub key_var: &'static str,
}

impl OpenAiConfig {
    /// Creates an OpenAI config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: OPENAI_API_URL.to_string(),
            provider: "OpenAI",
            key_var: "OPENAI_API_KEY",
        }
    }

    /// Creates a config for Groq's OpenAI-compatible endpoint.
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: GROQ_API_URL.to_string(),
            provider: "Groq",
            key_var: "GROQ_API_KEY",
            ..Self::new(api_key, model)
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WardenError::generation(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(&self, status: reqwest::StatusCode, body: &str) -> (WardenError, bool) {
        let provider = self.config.provider;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                WardenError::generation(format!(
                    "Authentication failed. Check your {}.",
                    self.config.key_var
                )),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (
                WardenError::generation(format!("{provider} rate limited the request")),
                true,
            );
        }

        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return (
                WardenError::generation(format!(
                    "{provider} API error: {}",
                    error_response.error.message
                )),
                is_retryable,
            );
        }

        (
            WardenError::generation(format!("{provider} API error ({status}): {body}")),
            is_retryable,
        )
    }

    fn is_retryable_request_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let provider = self.config.provider;
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            temperature: 0.0,
        };

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(provider, attempt, "Sending completion request");

            let result = self
                .client
                .post(&self.config.base_url)
                .bearer_auth(&self.config.api_key)
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
                        let response: OpenAiResponse = serde_json::from_str(&body).map_err(|e| {
                            WardenError::generation(format!("Failed to parse response: {e}"))
                        })?;

                        return response
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message.content)
                            .ok_or_else(|| {
                                WardenError::generation(format!("No response from {provider}"))
                            });
                    }

                    let (error, is_retryable) = self.parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(provider, attempt, %status, "Request failed, retrying in {delay:?}");
                }
                Err(e) => {
                    let is_retryable = Self::is_retryable_request_error(&e);
                    last_error = Some(WardenError::generation(format!(
                        "Failed to reach {provider}: {e}"
                    )));

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(provider, attempt, "Request error, retrying in {delay:?}: {e}");
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error.unwrap_or_else(|| WardenError::generation(format!("{provider} request failed"))))
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
