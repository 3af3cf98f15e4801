//! Approval requests and their audit history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExecutionErrorKind, Result, WardenError};
use crate::safety::{ClassificationResult, ParsedStatement};

use super::state::{ApprovalEvent, ApprovalState};

/// Unique identifier of a proposed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementId(Uuid);

impl StatementId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StatementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for StatementId {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| WardenError::parse(format!("invalid statement id '{s}': {e}")))
    }
}

/// A human decision on a proposed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn event(self) -> ApprovalEvent {
        match self {
            Self::Approve => ApprovalEvent::Approve,
            Self::Reject => ApprovalEvent::Reject,
        }
    }
}

/// Who caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// An explicit external decision or execution call.
    User,
    /// The auto-approval policy or the classifier's rejection.
    Policy,
    /// Time-to-live expiry.
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Policy => write!(f, "policy"),
            Self::System => write!(f, "system"),
        }
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ApprovalState,
    pub to: ApprovalState,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// What happened when an executed statement reached the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Succeeded {
        row_count: usize,
        affected_rows: Option<u64>,
    },
    Failed {
        kind: ExecutionErrorKind,
        message: String,
    },
}

/// The unit tracked by the approval gate: one proposed statement, its
/// classification, and everything that happened to it since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRequest {
    pub id: StatementId,
    pub statement: ParsedStatement,
    pub classification: ClassificationResult,
    pub state: ApprovalState,
    pub created_at: DateTime<Utc>,
    /// Set when the request leaves `Proposed` by approval or rejection.
    pub decided_at: Option<DateTime<Utc>>,
    /// Every transition, oldest first.
    pub history: Vec<Transition>,
    pub outcome: Option<ExecutionOutcome>,
}

impl ApprovalRequest {
    pub(crate) fn new(
        statement: ParsedStatement,
        classification: ClassificationResult,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StatementId::new(),
            statement,
            classification,
            state: ApprovalState::Proposed,
            created_at: now,
            decided_at: None,
            history: Vec::new(),
            outcome: None,
        }
    }

    /// Applies `event`, recording the transition.
    pub(crate) fn apply(
        &mut self,
        event: ApprovalEvent,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<ApprovalState> {
        let next = self
            .state
            .on(event)
            .ok_or_else(|| WardenError::InvalidTransition {
                id: self.id,
                from: self.state,
                event,
            })?;

        if matches!(event, ApprovalEvent::Approve | ApprovalEvent::Reject) {
            self.decided_at = Some(now);
        }
        self.history.push(Transition {
            from: self.state,
            to: next,
            actor,
            at: now,
        });
        self.state = next;
        Ok(next)
    }

    /// When the request stops being actionable.
    ///
    /// A proposal lives `ttl` from creation, an approval `ttl` from the
    /// decision. Terminal requests have no deadline; a deadline beyond the
    /// representable range means never.
    pub fn deadline(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        let start = match self.state {
            ApprovalState::Proposed => self.created_at,
            ApprovalState::Approved => self.decided_at.unwrap_or(self.created_at),
            ApprovalState::Rejected | ApprovalState::Executed | ApprovalState::Expired => {
                return None
            }
        };
        start.checked_add_signed(ttl)
    }

    /// Returns true if the request has outlived `ttl` at `now`.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.deadline(ttl).is_some_and(|deadline| now >= deadline)
    }

    /// Returns the SQL text that would be sent to the database.
    pub fn sql(&self) -> &str {
        self.statement.statement_text()
    }
}
