//! End-to-end pipeline: question -> model -> classifier -> gate -> database,
//! with mock model and database clients.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use sql_warden::app::{App, ExitStatus};
use sql_warden::approval::{ApprovalState, AutoApprovePolicy, Decision, ExecutionOutcome};
use sql_warden::cli::Command;
use sql_warden::config::SafetyConfig;
use sql_warden::db::{sample_schema, MockDatabaseClient};
use sql_warden::error::{ExecutionErrorKind, WardenError};
use sql_warden::llm::{LlmSqlGenerator, MockLlmClient, OperationHint};
use sql_warden::query::ExecuteOptions;
use sql_warden::service::{Proposal, QueryService};
use tokio_util::sync::CancellationToken;

async fn service_over(db: Arc<MockDatabaseClient>, llm: MockLlmClient) -> QueryService {
    let generator = Arc::new(LlmSqlGenerator::new(Arc::new(llm)));
    let service = QueryService::new(db, &SafetyConfig::default())
        .unwrap()
        .with_generator(generator);
    service.refresh_schema().await.unwrap();
    service
}

fn shop_db() -> Arc<MockDatabaseClient> {
    Arc::new(MockDatabaseClient::with_schema(sample_schema()).with_affected_rows(1))
}

#[tokio::test]
async fn test_question_to_rows() {
    let db = shop_db();
    let service = service_over(Arc::clone(&db), MockLlmClient::new()).await;

    let proposal = service
        .propose("list all products", OperationHint::Select)
        .await
        .unwrap();
    assert_eq!(proposal.state, ApprovalState::Approved);
    assert_eq!(proposal.explanation, "Lists products.");

    let result = service
        .execute(proposal.statement_id, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(db.executed(), vec!["SELECT * FROM products LIMIT 1000".to_string()]);
}

#[tokio::test]
async fn test_delete_question_waits_for_approval() {
    let db = shop_db();
    let service = service_over(Arc::clone(&db), MockLlmClient::new()).await;

    let proposal = service
        .propose("delete order 42", OperationHint::Delete)
        .await
        .unwrap();
    assert!(proposal.awaiting_decision());
    assert!(proposal.classification.requires_approval);
    assert!(proposal
        .classification
        .warnings
        .iter()
        .any(|w| w == "Model note: The order is removed permanently."));

    // Nothing runs before a decision.
    let err = service
        .execute(proposal.statement_id, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidTransition { .. }));
    assert!(db.executed().is_empty());

    service.decide(proposal.statement_id, Decision::Approve).unwrap();
    let result = service
        .execute(proposal.statement_id, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result.affected_rows, Some(1));
    assert_eq!(db.executed(), vec!["DELETE FROM orders WHERE order_id = 42".to_string()]);

    let request = service.request(proposal.statement_id).unwrap();
    assert_eq!(request.state, ApprovalState::Executed);
    assert_eq!(
        request.outcome,
        Some(ExecutionOutcome::Succeeded {
            row_count: 0,
            affected_rows: Some(1),
        })
    );
}

#[tokio::test]
async fn test_dangerous_generation_is_rejected() {
    let db = shop_db();
    let service = service_over(Arc::clone(&db), MockLlmClient::new()).await;

    let proposal = service
        .propose("drop the orders table", OperationHint::Any)
        .await
        .unwrap();
    assert_eq!(proposal.state, ApprovalState::Rejected);
    assert!(proposal.classification.is_blocked());

    assert!(service.decide(proposal.statement_id, Decision::Approve).is_err());
    assert!(service
        .execute(proposal.statement_id, ExecuteOptions::default())
        .await
        .is_err());
    assert!(db.executed().is_empty());
    assert_eq!(service.audit_log().len(), 1);
}

#[tokio::test]
async fn test_model_failure_creates_no_request() {
    let db = shop_db();
    let service = service_over(Arc::clone(&db), MockLlmClient::failing("model offline")).await;

    let err = service
        .propose("list all products", OperationHint::Any)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Generation(_)));
    assert!(service.pending().is_empty());
    assert!(service.audit_log().is_empty());
}

#[tokio::test]
async fn test_concurrent_proposals_get_distinct_ids() {
    let service = service_over(shop_db(), MockLlmClient::new()).await;

    let questions = ["list products", "count orders", "delete order 7", "raise the price"];
    let proposals: Vec<Proposal> = join_all(
        questions
            .iter()
            .cycle()
            .take(16)
            .map(|q| service.propose(q, OperationHint::Any)),
    )
    .await
    .into_iter()
    .collect::<Result<_, _>>()
    .unwrap();

    let ids: HashSet<_> = proposals.iter().map(|p| p.statement_id).collect();
    assert_eq!(ids.len(), 16);
    // Auto-approved requests stay pending until executed.
    let open = proposals.iter().filter(|p| !p.state.is_terminal()).count();
    assert_eq!(service.pending().len(), open);
    let awaiting = proposals.iter().filter(|p| p.awaiting_decision()).count();
    let proposed = service
        .pending()
        .iter()
        .filter(|r| r.state == ApprovalState::Proposed)
        .count();
    assert_eq!(proposed, awaiting);
}

#[tokio::test]
async fn test_execution_timeout_is_recorded() {
    let db = Arc::new(
        MockDatabaseClient::with_schema(sample_schema()).with_delay(Duration::from_millis(500)),
    );
    let service = service_over(Arc::clone(&db), MockLlmClient::new()).await;

    let proposal = service.propose_sql("SELECT name FROM products LIMIT 5").unwrap();
    let err = service
        .execute(
            proposal.statement_id,
            ExecuteOptions::default().with_timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WardenError::Execution {
            kind: ExecutionErrorKind::Timeout,
            ..
        }
    ));

    let request = service.request(proposal.statement_id).unwrap();
    assert_eq!(request.state, ApprovalState::Executed);
    assert!(matches!(
        request.outcome,
        Some(ExecutionOutcome::Failed {
            kind: ExecutionErrorKind::Timeout,
            ..
        })
    ));
}

#[tokio::test]
async fn test_cancelled_execution() {
    let db = Arc::new(
        MockDatabaseClient::with_schema(sample_schema()).with_delay(Duration::from_millis(500)),
    );
    let service = service_over(db, MockLlmClient::new()).await;

    let proposal = service.propose_sql("SELECT name FROM products LIMIT 5").unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = service
        .execute(
            proposal.statement_id,
            ExecuteOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WardenError::Execution {
            kind: ExecutionErrorKind::Cancelled,
            ..
        }
    ));
}

#[test]
fn test_validate_against_refreshed_schema() {
    let service = QueryService::new(shop_db(), &SafetyConfig::default()).unwrap();

    // Before the first refresh the snapshot is empty and unknown tables
    // are not reported.
    let result = service.validate("SELECT * FROM customers LIMIT 5").unwrap();
    assert!(result.warnings.iter().all(|w| !w.contains("does not exist")));

    tokio_test::block_on(service.refresh_schema()).unwrap();
    let result = service.validate("SELECT * FROM customers LIMIT 5").unwrap();
    assert!(result
        .warnings
        .iter()
        .any(|w| w == "Table 'customers' does not exist in the current schema"));
}

#[tokio::test]
async fn test_app_json_report_for_question() {
    let service = service_over(shop_db(), MockLlmClient::new()).await;
    let app = App::new(service, true);

    let command = Command::Ask {
        question: "show me the products".to_string(),
        operation: OperationHint::Select,
        yes: false,
    };
    let mut out = Vec::new();
    let mut never = |_: &Proposal| -> bool { panic!("auto-approved select must not prompt") };
    let status = app.run(&command, &mut out, &mut never).await.unwrap();
    assert_eq!(status, ExitStatus::Success);

    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["proposal"]["state"], "approved");
    assert_eq!(report["proposal"]["sql"], "SELECT * FROM products LIMIT 1000");
    assert_eq!(report["result"]["row_count"], 1);
}

#[tokio::test]
async fn test_app_declined_update_leaves_database_untouched() {
    let db = shop_db();
    let safety = SafetyConfig {
        auto_approve: AutoApprovePolicy::LowRisk,
        ..SafetyConfig::default()
    };
    let service = QueryService::new(Arc::clone(&db) as _, &safety).unwrap();
    service.refresh_schema().await.unwrap();
    let app = App::new(service, false);

    let command = Command::Run {
        sql: "UPDATE products SET price = 5 WHERE product_id = 1".to_string(),
        yes: false,
    };
    let mut out = Vec::new();
    let mut decline = |_: &Proposal| false;
    let status = app.run(&command, &mut out, &mut decline).await.unwrap();

    assert_eq!(status, ExitStatus::Declined);
    assert_eq!(status.code(), 3);
    assert!(db.executed().is_empty());
    let audit = app.service().audit_log();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].state, ApprovalState::Rejected);
}
