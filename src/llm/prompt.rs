//! Prompt construction for SQL generation requests.
//!
//! Builds a system prompt with the database schema and the response format
//! the parser expects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::Schema;
use crate::error::WardenError;
use crate::llm::types::Message;
use crate::safety::DEFAULT_ROW_LIMIT;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are an expert SQL assistant for a PostgreSQL database. Generate one SQL statement for the user's request.

DATABASE SCHEMA:
{schema}

RULES:
1. Generate ONLY valid PostgreSQL syntax
2. Use only table and column names from the schema above
3. For SELECT queries, include LIMIT {limit} unless the user specifies otherwise
4. For UPDATE and DELETE, ALWAYS include a WHERE clause unless the user explicitly asks for all rows
5. Use JOINs that follow the foreign keys
6. Never generate DROP, TRUNCATE, ALTER, CREATE, GRANT or REVOKE statements
7. Return exactly one statement

OUTPUT FORMAT (follow exactly, no markdown):

SQL:
<the SQL statement>

EXPLANATION:
<what the statement does, in plain English>

WARNINGS:
<concerns about the statement, or "None">"#;

/// The kind of statement the caller expects the model to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationHint {
    Select,
    Insert,
    Update,
    Delete,
    #[default]
    Any,
}

impl OperationHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Any => "any",
        }
    }

    /// Instruction appended to the question, if any.
    fn instruction(&self) -> Option<String> {
        match self {
            Self::Any => None,
            other => Some(format!(
                "Generate a {} statement.",
                other.as_str().to_uppercase()
            )),
        }
    }
}

impl FromStr for OperationHint {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "any" | "" => Ok(Self::Any),
            _ => Err(WardenError::config(format!("Unknown operation type: {s}"))),
        }
    }
}

impl fmt::Display for OperationHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the system prompt with the schema injected.
pub fn build_system_prompt(schema: &Schema) -> String {
    SYSTEM_PROMPT_TEMPLATE
        .replace("{schema}", &schema.format_for_llm())
        .replace("{limit}", &DEFAULT_ROW_LIMIT.to_string())
}

/// Builds the message list for one generation request.
pub fn build_messages(question: &str, schema: &Schema, hint: OperationHint) -> Vec<Message> {
    let question = question.trim();
    let user = match hint.instruction() {
        Some(instruction) => format!("USER REQUEST: {question}\n\n{instruction}"),
        None => format!("USER REQUEST: {question}"),
    };
    vec![Message::system(build_system_prompt(schema)), Message::user(user)]
}
