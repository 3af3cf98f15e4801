//! Approval gate for classified statements.
//!
//! Every statement that passes classification gets an [`ApprovalRequest`]
//! that starts in `Proposed`. Requests move through the lifecycle in
//! [`ApprovalState`] under a single lock, so concurrent callers racing on the
//! same identifier see exactly one winner and the rest get
//! [`WardenError::InvalidTransition`].
//!
//! Execution is gated by [`ApprovalGate::claim`], which atomically moves an
//! `Approved` request to `Executed` and hands back an [`ApprovedStatement`].
//! That value cannot be built anywhere else, so the execution adapter can
//! only ever run statements that went through the gate.

mod request;
mod state;

pub use request::{
    Actor, ApprovalRequest, Decision, ExecutionOutcome, StatementId, Transition,
};
pub use state::{ApprovalEvent, ApprovalState};

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, WardenError};
use crate::safety::{ClassificationResult, ParsedStatement, RiskLevel, StatementKind};

/// Default time a request stays actionable.
pub const DEFAULT_APPROVAL_TTL_SECS: u64 = 300;

/// Default number of finished requests kept for the audit log.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// Which requests the gate approves on its own, recorded with [`Actor::Policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoApprovePolicy {
    /// Every request waits for an explicit decision.
    None,
    /// Low-risk SELECTs only.
    #[default]
    ReadOnly,
    /// Any low-risk statement, including INSERTs.
    LowRisk,
}

impl AutoApprovePolicy {
    /// Returns true if the policy approves a request with this classification.
    pub fn allows(&self, classification: &ClassificationResult) -> bool {
        if classification.is_blocked() || classification.risk_level != RiskLevel::Low {
            return false;
        }
        match self {
            Self::None => false,
            Self::ReadOnly => classification.kind == StatementKind::Select,
            Self::LowRisk => true,
        }
    }
}

/// A statement cleared for execution.
///
/// Only [`ApprovalGate::claim`] creates these; holding one proves the
/// request was approved, had no classification errors, and has now been
/// marked executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedStatement {
    id: StatementId,
    sql: String,
    kind: StatementKind,
    row_limit: Option<u32>,
}

impl ApprovedStatement {
    pub fn id(&self) -> StatementId {
        self.id
    }

    /// The normalized statement text (no trailing terminator).
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Row limit to inject before running a SELECT, if any.
    pub fn row_limit(&self) -> Option<u32> {
        self.row_limit
    }
}

#[derive(Debug, Default)]
struct Requests {
    by_id: HashMap<StatementId, ApprovalRequest>,
    /// Terminal requests, oldest first, for audit retention.
    finished: VecDeque<StatementId>,
}

/// Tracks approval requests through their lifecycle.
#[derive(Debug)]
pub struct ApprovalGate {
    requests: Mutex<Requests>,
    ttl: Duration,
    policy: AutoApprovePolicy,
    audit_capacity: usize,
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new(
            std::time::Duration::from_secs(DEFAULT_APPROVAL_TTL_SECS),
            AutoApprovePolicy::default(),
            DEFAULT_AUDIT_CAPACITY,
        )
    }
}

impl ApprovalGate {
    /// Creates a gate.
    ///
    /// A zero `ttl` expires requests on first access. `audit_capacity` is
    /// clamped to at least one.
    pub fn new(
        ttl: std::time::Duration,
        policy: AutoApprovePolicy,
        audit_capacity: usize,
    ) -> Self {
        Self {
            requests: Mutex::new(Requests::default()),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            policy,
            audit_capacity: audit_capacity.max(1),
        }
    }

    pub fn policy(&self) -> AutoApprovePolicy {
        self.policy
    }

    /// Time-to-live as a std duration.
    pub fn ttl(&self) -> std::time::Duration {
        self.ttl.to_std().unwrap_or(std::time::Duration::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, Requests> {
        // A panic while holding the lock cannot leave a request half-updated:
        // `ApprovalRequest::apply` validates before mutating.
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a classified statement and returns a snapshot of the new
    /// request.
    ///
    /// The request is recorded as `Proposed` first. Error-bearing requests
    /// are then rejected by policy, and requests the auto-approval policy
    /// covers are approved by policy, so both show up in the history.
    pub fn propose(
        &self,
        statement: ParsedStatement,
        classification: ClassificationResult,
    ) -> ApprovalRequest {
        self.propose_at(statement, classification, Utc::now())
    }

    pub(crate) fn propose_at(
        &self,
        statement: ParsedStatement,
        classification: ClassificationResult,
        now: DateTime<Utc>,
    ) -> ApprovalRequest {
        let mut request = ApprovalRequest::new(statement, classification, now);

        let follow_up = if request.classification.is_blocked() {
            Some(ApprovalEvent::Reject)
        } else if self.policy.allows(&request.classification) {
            Some(ApprovalEvent::Approve)
        } else {
            None
        };
        if let Some(event) = follow_up {
            // Proposed accepts both events.
            let _ = request.apply(event, Actor::Policy, now);
        }

        info!(
            statement_id = %request.id,
            kind = %request.classification.kind,
            risk = %request.classification.risk_level,
            state = %request.state,
            "Statement proposed"
        );
        if request.state == ApprovalState::Rejected {
            warn!(
                statement_id = %request.id,
                errors = ?request.classification.errors,
                "Statement rejected by policy"
            );
        }

        let snapshot = request.clone();
        let mut requests = self.lock();
        let id = request.id;
        let terminal = request.state.is_terminal();
        requests.by_id.insert(id, request);
        if terminal {
            self.retire(&mut requests, id);
        }
        snapshot
    }

    /// Applies an external decision and returns the new state.
    ///
    /// Fails with `InvalidTransition` unless the request is still
    /// `Proposed` (an expired request reports `expired`).
    pub fn decide(&self, id: StatementId, decision: Decision) -> Result<ApprovalState> {
        self.decide_at(id, decision, Utc::now())
    }

    pub(crate) fn decide_at(
        &self,
        id: StatementId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<ApprovalState> {
        let mut requests = self.lock();
        self.expire_if_stale(&mut requests, id, now)?;

        let request = requests.by_id.get_mut(&id).ok_or(WardenError::NotFound(id))?;
        let state = request.apply(decision.event(), Actor::User, now)?;
        info!(statement_id = %id, state = %state, "Decision recorded");

        if state.is_terminal() {
            self.retire(&mut requests, id);
        }
        Ok(state)
    }

    /// Claims an approved request for execution.
    ///
    /// Atomically moves `Approved` to `Executed`. A request can be claimed
    /// at most once; a request with classification errors is never claimed
    /// whatever its state.
    pub fn claim(&self, id: StatementId) -> Result<ApprovedStatement> {
        self.claim_at(id, Utc::now())
    }

    pub(crate) fn claim_at(&self, id: StatementId, now: DateTime<Utc>) -> Result<ApprovedStatement> {
        let mut requests = self.lock();
        self.expire_if_stale(&mut requests, id, now)?;

        let request = requests.by_id.get_mut(&id).ok_or(WardenError::NotFound(id))?;
        if request.classification.is_blocked() {
            warn!(statement_id = %id, "Refusing to execute a statement with classification errors");
            return Err(WardenError::InvalidTransition {
                id,
                from: request.state,
                event: ApprovalEvent::Execute,
            });
        }

        request.apply(ApprovalEvent::Execute, Actor::User, now)?;
        let approved = ApprovedStatement {
            id,
            sql: request.sql().to_string(),
            kind: request.statement.kind,
            row_limit: request.classification.row_limit,
        };
        info!(statement_id = %id, "Statement claimed for execution");

        self.retire(&mut requests, id);
        Ok(approved)
    }

    /// Stores what happened when a claimed statement ran.
    pub fn record_outcome(&self, id: StatementId, outcome: ExecutionOutcome) -> Result<()> {
        let mut requests = self.lock();
        let request = requests.by_id.get_mut(&id).ok_or(WardenError::NotFound(id))?;
        if request.state != ApprovalState::Executed {
            return Err(WardenError::internal(format!(
                "cannot record an outcome for statement {id} while it is {}",
                request.state
            )));
        }
        request.outcome = Some(outcome);
        Ok(())
    }

    /// Returns a snapshot of a request, applying expiry first.
    pub fn get(&self, id: StatementId) -> Result<ApprovalRequest> {
        let mut requests = self.lock();
        self.expire_if_stale(&mut requests, id, Utc::now())?;
        requests
            .by_id
            .get(&id)
            .cloned()
            .ok_or(WardenError::NotFound(id))
    }

    /// Expires every stale request. Returns how many were expired.
    pub fn expire_stale(&self) -> usize {
        self.expire_stale_at(Utc::now())
    }

    pub fn expire_stale_at(&self, now: DateTime<Utc>) -> usize {
        let mut requests = self.lock();
        let stale: Vec<StatementId> = requests
            .by_id
            .values()
            .filter(|request| request.is_stale(self.ttl, now))
            .map(|request| request.id)
            .collect();

        for id in &stale {
            // Stale implies Proposed or Approved, both of which accept Expire.
            let _ = self.expire_if_stale(&mut requests, *id, now);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "Expired stale requests");
        }
        stale.len()
    }

    /// Requests still waiting for a decision or execution, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let requests = self.lock();
        let mut pending: Vec<ApprovalRequest> = requests
            .by_id
            .values()
            .filter(|request| !request.state.is_terminal())
            .cloned()
            .collect();
        pending.sort_by_key(|request| request.created_at);
        pending
    }

    /// Finished requests in the order they finished, oldest first.
    pub fn audit_log(&self) -> Vec<ApprovalRequest> {
        let requests = self.lock();
        requests
            .finished
            .iter()
            .filter_map(|id| requests.by_id.get(id).cloned())
            .collect()
    }

    fn expire_if_stale(
        &self,
        requests: &mut Requests,
        id: StatementId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let request = requests.by_id.get_mut(&id).ok_or(WardenError::NotFound(id))?;
        if request.is_stale(self.ttl, now) {
            request.apply(ApprovalEvent::Expire, Actor::System, now)?;
            warn!(statement_id = %id, "Request expired");
            self.retire(requests, id);
        }
        Ok(())
    }

    /// Moves a terminal request into audit retention, evicting the oldest
    /// finished requests beyond capacity.
    fn retire(&self, requests: &mut Requests, id: StatementId) {
        requests.finished.push_back(id);
        while requests.finished.len() > self.audit_capacity {
            if let Some(evicted) = requests.finished.pop_front() {
                requests.by_id.remove(&evicted);
            }
        }
    }
}
