//! Natural-language to SQL generation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::db::Schema;
use crate::error::{Result, WardenError};
use crate::llm::{build_messages, parse_llm_response, GeneratedSql, LlmClient, OperationHint};

/// Produces candidate SQL for a question. Output is untrusted and always
/// goes through parsing and classification.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        schema: &Schema,
        hint: OperationHint,
    ) -> Result<GeneratedSql>;
}

/// Generator backed by a chat model.
#[derive(Clone)]
pub struct LlmSqlGenerator {
    client: Arc<dyn LlmClient>,
}

impl LlmSqlGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SqlGenerator for LlmSqlGenerator {
    async fn generate(
        &self,
        question: &str,
        schema: &Schema,
        hint: OperationHint,
    ) -> Result<GeneratedSql> {
        if question.trim().is_empty() {
            return Err(WardenError::generation("Question is empty"));
        }

        let messages = build_messages(question, schema, hint);
        let response = self.client.complete(&messages).await?;
        debug!(response_len = response.len(), %hint, "Model responded");
        parse_llm_response(&response)
    }
}

impl std::fmt::Debug for LlmSqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSqlGenerator").finish_non_exhaustive()
    }
}
