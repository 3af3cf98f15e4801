//! Database abstraction layer.
//!
//! Provides a trait-based interface for the database operations the
//! pipeline needs, so the PostgreSQL client and in-memory mocks can be used
//! interchangeably.

mod mock;
mod postgres;
pub(crate) mod schema;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use schema::{sample_schema, Column, ForeignKey, Schema, Table};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Connects to the database described by `config`.
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn DatabaseClient>> {
    let client = PostgresClient::connect(config).await?;
    Ok(Arc::new(client))
}

/// Interface for database clients.
///
/// Implementations run exactly the SQL they are given. Deciding whether a
/// statement may run is the approval gate's job, not the client's.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Introspects the database schema, returning table and relationship information.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Runs a statement that returns rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Runs a statement that modifies data and returns the affected-row count.
    async fn execute_statement(&self, sql: &str) -> Result<QueryResult>;

    /// Checks that the database is reachable.
    async fn ping(&self) -> Result<()>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
