//! Error types for sql-warden.
//!
//! Defines the main error enum used throughout the pipeline. Policy
//! rejections are not errors: they are reported through
//! [`ClassificationResult::errors`](crate::safety::ClassificationResult).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approval::{ApprovalEvent, ApprovalState, StatementId};

/// Distinguishes the ways a statement execution can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionErrorKind {
    /// The database rejected or failed the statement.
    Database,
    /// The caller-supplied deadline elapsed before the database answered.
    Timeout,
    /// The caller cancelled the execution.
    Cancelled,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => write!(f, "database"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Main error type for sql-warden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// The text is not a single recognizable SQL statement.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A state-machine transition was attempted from the wrong state.
    #[error("Invalid transition: cannot {event} statement {id} while it is {from}")]
    InvalidTransition {
        id: StatementId,
        from: ApprovalState,
        event: ApprovalEvent,
    },

    /// No approval request exists for the identifier.
    #[error("Unknown statement: {0}")]
    NotFound(StatementId),

    /// Re-validation before execution found policy errors under the
    /// current rules.
    #[error("Statement {id} blocked: {}", .errors.join("; "))]
    Blocked { id: StatementId, errors: Vec<String> },

    /// Statement execution failed (database error, timeout, cancellation).
    #[error("Execution error ({kind}): {message}")]
    Execution {
        kind: ExecutionErrorKind,
        message: String,
    },

    /// The language model could not produce a usable statement.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Schema introspection failed or a table lookup missed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration errors (invalid config file, bad safety rules, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates a database execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution {
            kind: ExecutionErrorKind::Database,
            message: msg.into(),
        }
    }

    /// Creates an execution timeout error.
    pub fn execution_timeout(msg: impl Into<String>) -> Self {
        Self::Execution {
            kind: ExecutionErrorKind::Timeout,
            message: msg.into(),
        }
    }

    /// Creates an execution cancellation error.
    pub fn execution_cancelled(msg: impl Into<String>) -> Self {
        Self::Execution {
            kind: ExecutionErrorKind::Cancelled,
            message: msg.into(),
        }
    }

    /// Creates a generation error with the given message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Creates a catalog error with the given message.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse(_) => "Parse Error",
            Self::InvalidTransition { .. } => "Invalid Transition",
            Self::NotFound(_) => "Not Found",
            Self::Blocked { .. } => "Blocked",
            Self::Execution { .. } => "Execution Error",
            Self::Generation(_) => "Generation Error",
            Self::Catalog(_) => "Catalog Error",
            Self::Connection(_) => "Connection Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the execution failure kind, if this is an execution error.
    pub fn execution_kind(&self) -> Option<ExecutionErrorKind> {
        match self {
            Self::Execution { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type alias using WardenError.
pub type Result<T> = std::result::Result<T, WardenError>;
