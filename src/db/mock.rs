//! Mock database clients for testing.
//!
//! Provides in-memory implementations so the full pipeline can run without
//! a database.

use super::{ColumnInfo, DatabaseClient, QueryResult, Schema, Value};
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A mock database client that returns canned results and records every
/// statement it was asked to run.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    schema: Schema,
    delay: Option<Duration>,
    affected_rows: u64,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Makes every statement take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the affected-row count reported for writes.
    pub fn with_affected_rows(mut self, count: u64) -> Self {
        self.affected_rows = count;
        self
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn record(&self, sql: &str) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql).await;
        let columns = vec![ColumnInfo::new("result", "text")];
        let rows = vec![vec![Value::String(format!("Mock result for: {sql}"))]];
        Ok(QueryResult::with_data(columns, rows).with_execution_time(Duration::from_millis(1)))
    }

    async fn execute_statement(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql).await;
        Ok(QueryResult::affected(self.affected_rows).with_execution_time(Duration::from_millis(1)))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A database client whose every operation fails.
#[derive(Debug, Clone)]
pub struct FailingDatabaseClient {
    message: String,
}

impl FailingDatabaseClient {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        Err(WardenError::catalog(self.message.clone()))
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        Err(WardenError::execution(self.message.clone()))
    }

    async fn execute_statement(&self, _sql: &str) -> Result<QueryResult> {
        Err(WardenError::execution(self.message.clone()))
    }

    async fn ping(&self) -> Result<()> {
        Err(WardenError::connection(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
