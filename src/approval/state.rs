//! Approval lifecycle states and the transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an approval request is in its lifecycle.
///
/// ```text
/// Proposed -> Approved | Rejected | Expired
/// Approved -> Executed | Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Proposed,
    Approved,
    Rejected,
    Executed,
    Expired,
}

/// Something that moves a request between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalEvent {
    Approve,
    Reject,
    Execute,
    Expire,
}

impl ApprovalState {
    /// Returns the state reached by applying `event`, or `None` if the
    /// transition is not allowed from this state.
    pub fn on(self, event: ApprovalEvent) -> Option<ApprovalState> {
        use ApprovalEvent as E;
        use ApprovalState as S;

        match (self, event) {
            (S::Proposed, E::Approve) => Some(S::Approved),
            (S::Proposed, E::Reject) => Some(S::Rejected),
            (S::Proposed, E::Expire) => Some(S::Expired),
            (S::Approved, E::Execute) => Some(S::Executed),
            (S::Approved, E::Expire) => Some(S::Expired),
            (S::Proposed | S::Approved, _)
            | (S::Rejected | S::Executed | S::Expired, _) => None,
        }
    }

    /// Returns true for states no event can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Executed | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ApprovalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Execute => "execute",
            Self::Expire => "expire",
        }
    }
}

impl fmt::Display for ApprovalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
