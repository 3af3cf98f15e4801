//! Mock model client.
//!
//! Answers in the structured response format with canned statements chosen
//! by keywords in the question, so the whole pipeline runs offline.

use async_trait::async_trait;

use crate::error::{Result, WardenError};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock client returning canned responses based on input patterns.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Checked before the built-in patterns (pattern -> response).
    custom_responses: Vec<(String, String)>,
    /// Fails every request with this message when set.
    failure: Option<String>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the question contains `pattern`, answer with `response` verbatim.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.custom_responses.push((pattern.into(), response.into()));
        self
    }

    /// A client whose every request fails with a generation error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    fn structured(sql: &str, explanation: &str, warnings: &str) -> String {
        format!("SQL:\n{sql}\n\nEXPLANATION:\n{explanation}\n\nWARNINGS:\n{warnings}")
    }

    fn mock_response(&self, input: &str) -> String {
        let input = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        let has = |word: &str| input.contains(word);
        let id = first_number(&input).unwrap_or(1);

        if has("drop") {
            return Self::structured(
                "DROP TABLE orders;",
                "Drops the orders table.",
                "This permanently destroys the table.",
            );
        }

        if (has("count") || has("how many")) && has("order") {
            return Self::structured(
                "SELECT COUNT(*) FROM orders;",
                "Counts all orders.",
                "None",
            );
        }

        if (has("delete") || has("remove")) && has("order") {
            return Self::structured(
                &format!("DELETE FROM orders WHERE order_id = {id};"),
                &format!("Deletes order {id}."),
                "The order is removed permanently.",
            );
        }

        if (has("update") || has("change") || has("set")) && has("price") {
            return Self::structured(
                &format!("UPDATE products SET price = price * 1.1 WHERE product_id = {id};"),
                &format!("Raises the price of product {id} by ten percent."),
                "None",
            );
        }

        if (has("add") || has("insert")) && has("product") {
            return Self::structured(
                "INSERT INTO products (name, price) VALUES ('New product', 10);",
                "Adds a new product.",
                "None",
            );
        }

        if has("product") {
            return Self::structured(
                "SELECT * FROM products LIMIT 1000;",
                "Lists products.",
                "None",
            );
        }

        Self::structured("SELECT 1;", "Returns a constant.", "None")
    }
}

fn first_number(input: &str) -> Option<u64> {
    input
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Some(message) = &self.failure {
            return Err(WardenError::generation(message.clone()));
        }

        let input = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        Ok(self.mock_response(input))
    }
}
