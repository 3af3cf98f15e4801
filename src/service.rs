//! Query service orchestrating the validation and approval pipeline.
//!
//! The single entry point for callers: the CLI drives every subcommand
//! through [`QueryService`], and integration tests wire one up with mock
//! collaborators.
//!
//! Data flow for a question:
//! generator → [`parse`] → [`Classifier`] → [`ApprovalGate`] (Proposed)
//! → decision → claim → [`QueryExecutor`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::approval::{
    ApprovalGate, ApprovalRequest, ApprovalState, Decision, ExecutionOutcome, StatementId,
};
use crate::catalog::SchemaCatalog;
use crate::config::SafetyConfig;
use crate::db::{DatabaseClient, QueryResult, Schema, Table};
use crate::error::{ExecutionErrorKind, Result, WardenError};
use crate::llm::{OperationHint, SqlGenerator};
use crate::query::{ExecuteOptions, QueryExecutor};
use crate::safety::{parse, ClassificationResult, Classifier, ParsedStatement, RuleSet};

/// Explanation attached to statements submitted as SQL.
pub const SUBMITTED_SQL_EXPLANATION: &str = "Statement submitted directly";

/// Prefix for warnings raised by the model rather than the classifier.
const MODEL_NOTE_PREFIX: &str = "Model note: ";

/// The response to a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub statement_id: StatementId,
    /// Normalized statement text, as it will be executed.
    pub sql: String,
    pub explanation: String,
    pub classification: ClassificationResult,
    /// State right after proposal: `proposed`, or `approved`/`rejected`
    /// when policy decided.
    pub state: ApprovalState,
}

impl Proposal {
    /// True when the statement is waiting for a human decision.
    pub fn awaiting_decision(&self) -> bool {
        self.state == ApprovalState::Proposed
    }
}

/// Orchestrates generation, validation, approval and execution.
pub struct QueryService {
    db: Arc<dyn DatabaseClient>,
    catalog: Arc<SchemaCatalog>,
    classifier: RwLock<Arc<Classifier>>,
    gate: Arc<ApprovalGate>,
    executor: QueryExecutor,
    generator: Option<Arc<dyn SqlGenerator>>,
}

impl QueryService {
    /// Creates a service with an empty schema snapshot and no generator.
    ///
    /// Call [`refresh_schema`](Self::refresh_schema) before proposing so
    /// the model and the classifier see the tables.
    pub fn new(db: Arc<dyn DatabaseClient>, safety: &SafetyConfig) -> Result<Self> {
        safety.validate()?;
        let gate = ApprovalGate::new(
            safety.approval_ttl(),
            safety.auto_approve,
            safety.audit_capacity,
        );

        Ok(Self {
            catalog: Arc::new(SchemaCatalog::new(Arc::clone(&db))),
            classifier: RwLock::new(Arc::new(Classifier::new(safety.rule_set()?))),
            gate: Arc::new(gate),
            executor: QueryExecutor::new(Arc::clone(&db))
                .with_default_timeout(safety.execution_timeout()),
            generator: None,
            db,
        })
    }

    /// Sets the generator used by [`propose`](Self::propose).
    pub fn with_generator(mut self, generator: Arc<dyn SqlGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// The approval gate, shared with background tasks such as the
    /// expiry sweeper.
    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    fn classifier(&self) -> Arc<Classifier> {
        Arc::clone(&self.classifier.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the rule set used for new proposals and execute-time
    /// re-validation.
    pub fn update_rules(&self, rules: RuleSet) {
        *self.classifier.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(Classifier::new(rules));
        info!("Safety rules updated");
    }

    /// Generates SQL for a question and submits it for approval.
    pub async fn propose(&self, question: &str, hint: OperationHint) -> Result<Proposal> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| WardenError::generation("No SQL generator configured"))?;
        let start = Instant::now();
        let schema = self.catalog.current_snapshot();
        debug!(question_len = question.len(), %hint, "Generating SQL");

        let generated = generator.generate(question, &schema, hint).await?;
        debug!(
            generation_ms = start.elapsed().as_millis() as u64,
            "Model produced a statement"
        );

        let statement = parse(&generated.sql)?;
        let mut classification = self.classifier().classify_against(&statement, &schema);
        classification.warnings.extend(
            generated
                .warnings
                .iter()
                .map(|w| format!("{MODEL_NOTE_PREFIX}{w}")),
        );

        Ok(self.submit(statement, classification, generated.explanation))
    }

    /// Submits caller-written SQL for approval, skipping generation.
    pub fn propose_sql(&self, sql: &str) -> Result<Proposal> {
        let statement = parse(sql)?;
        let schema = self.catalog.current_snapshot();
        let classification = self.classifier().classify_against(&statement, &schema);
        Ok(self.submit(statement, classification, SUBMITTED_SQL_EXPLANATION.to_string()))
    }

    fn submit(
        &self,
        statement: ParsedStatement,
        classification: ClassificationResult,
        explanation: String,
    ) -> Proposal {
        let request = self.gate.propose(statement, classification);
        Proposal {
            statement_id: request.id,
            sql: request.sql().to_string(),
            explanation,
            classification: request.classification,
            state: request.state,
        }
    }

    /// Records an approve/reject decision and returns the new state.
    pub fn decide(&self, id: StatementId, decision: Decision) -> Result<ApprovalState> {
        self.gate.decide(id, decision)
    }

    /// Executes an approved statement.
    ///
    /// The stored text is parsed and classified again under the current
    /// rules first; any error blocks execution and the request keeps its
    /// state. The outcome is recorded on the request either way.
    pub async fn execute(&self, id: StatementId, options: ExecuteOptions) -> Result<QueryResult> {
        let request = self.gate.get(id)?;
        let statement = parse(request.sql())?;
        let recheck = self.classifier().classify(&statement);
        if recheck.is_blocked() {
            warn!(statement_id = %id, errors = ?recheck.errors, "Execution blocked on re-validation");
            return Err(WardenError::Blocked {
                id,
                errors: recheck.errors,
            });
        }

        let approved = self.gate.claim(id)?;
        let result = self.executor.execute(&approved, options).await;

        let outcome = match &result {
            Ok(result) => {
                info!(statement_id = %id, summary = %result.summary(), "Statement executed");
                ExecutionOutcome::Succeeded {
                    row_count: result.row_count,
                    affected_rows: result.affected_rows,
                }
            }
            Err(WardenError::Execution { kind, message }) => ExecutionOutcome::Failed {
                kind: *kind,
                message: message.clone(),
            },
            Err(other) => ExecutionOutcome::Failed {
                kind: ExecutionErrorKind::Database,
                message: other.to_string(),
            },
        };
        if let Err(e) = self.gate.record_outcome(id, outcome) {
            warn!(statement_id = %id, "Could not record execution outcome: {e}");
        }

        result
    }

    /// Parses and classifies without creating a request.
    pub fn validate(&self, sql: &str) -> Result<ClassificationResult> {
        let statement = parse(sql)?;
        let schema = self.catalog.current_snapshot();
        Ok(self.classifier().classify_against(&statement, &schema))
    }

    /// Snapshot of a single request.
    pub fn request(&self, id: StatementId) -> Result<ApprovalRequest> {
        self.gate.get(id)
    }

    pub fn pending(&self) -> Vec<ApprovalRequest> {
        self.gate.pending()
    }

    pub fn audit_log(&self) -> Vec<ApprovalRequest> {
        self.gate.audit_log()
    }

    /// The current schema snapshot.
    pub fn schema(&self) -> Arc<Schema> {
        self.catalog.current_snapshot()
    }

    /// Looks up one table; a miss is a catalog error.
    pub fn table(&self, name: &str) -> Result<Table> {
        self.catalog.table(name)
    }

    pub async fn refresh_schema(&self) -> Result<Arc<Schema>> {
        self.catalog.refresh().await
    }

    /// Checks that the database answers.
    pub async fn health(&self) -> Result<()> {
        self.db.ping().await
    }

    pub async fn close(&self) -> Result<()> {
        self.db.close().await
    }
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("catalog", &self.catalog)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Expires stale requests every `interval` until `cancel` fires.
pub fn spawn_expiry_sweeper(
    gate: Arc<ApprovalGate>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Expiry sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = gate.expire_stale();
                    if expired > 0 {
                        info!(expired, "Expired stale approval requests");
                    }
                }
            }
        }
    })
}
