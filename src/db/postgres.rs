//! PostgreSQL database client implementation.
//!
//! Implements [`DatabaseClient`] for PostgreSQL using a `sqlx` pool.

use crate::config::ConnectionConfig;
use crate::db::{Column, ColumnInfo, DatabaseClient, ForeignKey, QueryResult, Row, Schema, Table, Value};
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use futures::future::{try_join, try_join_all};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Creates a client from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects, retrying transient failures with exponential backoff.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(Self { pool });
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, config)),
            }
        }
    }

    async fn fetch_tables(&self) -> Result<Vec<Table>> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WardenError::catalog(format!("Failed to fetch tables: {e}")))?;

        // Per-table lookups run concurrently over the pool; order is kept.
        try_join_all(table_names.into_iter().map(|name| async move {
            let (columns, primary_key) =
                try_join(self.fetch_columns(&name), self.fetch_primary_key(&name)).await?;
            Ok::<_, WardenError>(Table {
                name,
                columns,
                primary_key,
            })
        }))
        .await
    }

    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<Column>> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT
                column_name::text,
                data_type::text,
                is_nullable::text,
                column_default::text
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            WardenError::catalog(format!("Failed to fetch columns for {table_name}: {e}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default)| Column {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
                default,
            })
            .collect())
    }

    async fn fetch_primary_key(&self, table_name: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.table_name = $1
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            WardenError::catalog(format!("Failed to fetch primary key for {table_name}: {e}"))
        })
    }

    async fn fetch_foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                tc.constraint_name::text,
                kcu.table_name::text AS from_table,
                kcu.column_name::text AS from_column,
                ccu.table_name::text AS to_table,
                ccu.column_name::text AS to_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY kcu.table_name, tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WardenError::catalog(format!("Failed to fetch foreign keys: {e}")))?;

        // Multi-column keys arrive as one row per column.
        let mut by_constraint: BTreeMap<String, ForeignKey> = BTreeMap::new();
        for (constraint, from_table, from_column, to_table, to_column) in rows {
            let fk = by_constraint
                .entry(constraint)
                .or_insert_with(|| ForeignKey::new(from_table, Vec::new(), to_table, Vec::new()));
            fk.from_columns.push(from_column);
            fk.to_columns.push(to_column);
        }

        Ok(by_constraint.into_values().collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        let (tables, foreign_keys) =
            try_join(self.fetch_tables(), self.fetch_foreign_keys()).await?;

        Ok(Schema {
            tables,
            foreign_keys,
        })
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let result = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WardenError::execution(format_query_error(e)))?;

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();
        let rows: Vec<Row> = result.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows).with_execution_time(start.elapsed()))
    }

    async fn execute_statement(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let done = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| WardenError::execution(format_query_error(e)))?;

        Ok(QueryResult::affected(done.rows_affected()).with_execution_time(start.elapsed()))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| WardenError::connection(format!("Health check failed: {e}")))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decodes one column by its PostgreSQL type name. Types without a direct
/// mapping are read as text; anything undecodable becomes NULL.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(index).ok().flatten()
    }

    let value = match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => get::<bool>(row, index).map(Value::Bool),
        "INT2" | "SMALLINT" => get::<i16>(row, index).map(|v| Value::Int(v.into())),
        "INT4" | "INT" | "INTEGER" => get::<i32>(row, index).map(|v| Value::Int(v.into())),
        "INT8" | "BIGINT" => get::<i64>(row, index).map(Value::Int),
        "FLOAT4" | "REAL" => get::<f32>(row, index).map(|v| Value::Float(v.into())),
        "FLOAT8" | "DOUBLE PRECISION" => get::<f64>(row, index).map(Value::Float),
        "BYTEA" => get::<Vec<u8>>(row, index).map(Value::Bytes),
        _ => get::<String>(row, index).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

/// Determines if a connection error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    [
        "connection refused",
        "timed out",
        "timeout",
        "temporarily unavailable",
        "connection reset",
        "broken pipe",
    ]
    .iter()
    .any(|needle| error_str.contains(needle))
}

/// Maps sqlx connection errors to user-facing messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> WardenError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        WardenError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        WardenError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        WardenError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        WardenError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        WardenError::connection(error.to_string())
    }
}

/// Formats a database error with PostgreSQL detail and hint, if present.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = format!("ERROR: {}", db_error.message());
    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }
    result
}
