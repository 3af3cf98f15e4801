//! PostgreSQL tests.
//!
//! Tests that need a live server read `DATABASE_URL` and skip when it is
//! unset.

use std::sync::Arc;

use sql_warden::approval::ApprovalState;
use sql_warden::config::{ConnectionConfig, SafetyConfig};
use sql_warden::db::{self, DatabaseClient, PostgresClient, Value};
use sql_warden::error::WardenError;
use sql_warden::query::ExecuteOptions;
use sql_warden::service::QueryService;

async fn live_client() -> Option<Arc<dyn DatabaseClient>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    db::connect(&config).await.ok()
}

#[tokio::test]
async fn test_ping_and_introspect() {
    let Some(client) = live_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    client.ping().await.unwrap();
    let schema = client.introspect_schema().await.unwrap();
    for table in &schema.tables {
        assert!(!table.name.is_empty());
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_select_through_gate() {
    let Some(client) = live_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let service = QueryService::new(client, &SafetyConfig::default()).unwrap();
    let proposal = service.propose_sql("SELECT 1 AS num LIMIT 1").unwrap();

    // No table to resolve, so the select needs an explicit approval.
    assert_eq!(proposal.state, ApprovalState::Proposed);
    service
        .decide(proposal.statement_id, sql_warden::approval::Decision::Approve)
        .unwrap();

    let result = service
        .execute(proposal.statement_id, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.columns[0].name, "num");
    assert_eq!(result.rows[0][0], Value::Int(1));
    service.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn test_connect_refused() {
    let config = ConnectionConfig {
        host: Some("127.0.0.1".to_string()),
        port: 1,
        database: Some("warden".to_string()),
        user: Some("warden".to_string()),
        password: None,
    };

    let err = PostgresClient::connect(&config).await.unwrap_err();
    assert!(matches!(err, WardenError::Connection(_)), "got {err:?}");
}
