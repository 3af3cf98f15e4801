//! Execution adapter for approved statements.
//!
//! Only accepts an [`ApprovedStatement`], which the approval gate hands out
//! once per approved request. Reads go through
//! [`DatabaseClient::execute_query`], writes through
//! [`DatabaseClient::execute_statement`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::approval::ApprovedStatement;
use crate::db::{DatabaseClient, QueryResult};
use crate::error::{Result, WardenError};
use crate::safety::StatementKind;

use super::with_row_limit;

/// Default execution deadline.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Deadline for this call; the executor's default when `None`.
    pub timeout: Option<Duration>,
    /// Aborts the call when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Runs approved statements against a database.
#[derive(Clone)]
pub struct QueryExecutor {
    db: Arc<dyn DatabaseClient>,
    default_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self {
            db,
            default_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the SQL that will actually be sent for `statement`.
    pub fn effective_sql(statement: &ApprovedStatement) -> String {
        match (statement.kind(), statement.row_limit()) {
            (StatementKind::Select, Some(limit)) => with_row_limit(statement.sql(), limit),
            _ => statement.sql().to_string(),
        }
    }

    /// Executes the statement.
    ///
    /// Fails with an execution error of kind `Timeout` when the deadline
    /// elapses and `Cancelled` when the token fires. Nothing is retried.
    pub async fn execute(
        &self,
        statement: &ApprovedStatement,
        options: ExecuteOptions,
    ) -> Result<QueryResult> {
        let sql = Self::effective_sql(statement);
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let cancel = options.cancel.unwrap_or_default();
        debug!(statement_id = %statement.id(), kind = %statement.kind(), "Executing statement");

        let run = async {
            if statement.kind() == StatementKind::Select {
                self.db.execute_query(&sql).await
            } else {
                self.db.execute_statement(&sql).await
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                Err(WardenError::execution_cancelled("execution cancelled by caller"))
            }
            outcome = tokio::time::timeout(timeout, run) => match outcome {
                Ok(result) => result,
                Err(_) => Err(WardenError::execution_timeout(format!(
                    "statement did not finish within {} ms",
                    timeout.as_millis()
                ))),
            },
        };

        if let Err(e) = &result {
            warn!(statement_id = %statement.id(), "Execution failed: {e}");
        }
        result
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
