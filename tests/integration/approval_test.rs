//! Approval gate behavior through the public API, including races between
//! threads sharing one gate.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use sql_warden::approval::{
    Actor, ApprovalGate, ApprovalRequest, ApprovalState, AutoApprovePolicy, Decision,
    ExecutionOutcome, StatementId,
};
use sql_warden::error::WardenError;
use sql_warden::safety::{classify, parse, RuleSet};

fn gate(policy: AutoApprovePolicy) -> ApprovalGate {
    ApprovalGate::new(Duration::from_secs(300), policy, 100)
}

fn propose(gate: &ApprovalGate, sql: &str) -> ApprovalRequest {
    let statement = parse(sql).unwrap();
    let classification = classify(&statement, &RuleSet::default());
    gate.propose(statement, classification)
}

#[test]
fn test_write_waits_for_decision_then_executes_once() {
    let gate = gate(AutoApprovePolicy::ReadOnly);
    let request = propose(&gate, "UPDATE products SET price = 10 WHERE product_id = 1");
    assert_eq!(request.state, ApprovalState::Proposed);
    assert_eq!(gate.pending().len(), 1);

    // Not approved yet.
    assert!(matches!(
        gate.claim(request.id),
        Err(WardenError::InvalidTransition { from: ApprovalState::Proposed, .. })
    ));

    assert_eq!(gate.decide(request.id, Decision::Approve).unwrap(), ApprovalState::Approved);
    let approved = gate.claim(request.id).unwrap();
    assert_eq!(approved.id(), request.id);
    assert_eq!(approved.sql(), "UPDATE products SET price = 10 WHERE product_id = 1");

    gate.record_outcome(
        request.id,
        ExecutionOutcome::Succeeded {
            row_count: 0,
            affected_rows: Some(1),
        },
    )
    .unwrap();

    let stored = gate.get(request.id).unwrap();
    assert_eq!(stored.state, ApprovalState::Executed);
    assert!(stored.outcome.is_some());
    let states: Vec<ApprovalState> = stored.history.iter().map(|t| t.to).collect();
    assert_eq!(states, vec![ApprovalState::Approved, ApprovalState::Executed]);
    assert!(gate.pending().is_empty());
}

#[test]
fn test_rejected_request_is_terminal() {
    let gate = gate(AutoApprovePolicy::None);
    let request = propose(&gate, "DELETE FROM orders WHERE order_id = 3");

    assert_eq!(gate.decide(request.id, Decision::Reject).unwrap(), ApprovalState::Rejected);
    for decision in [Decision::Approve, Decision::Reject] {
        assert!(matches!(
            gate.decide(request.id, decision),
            Err(WardenError::InvalidTransition { from: ApprovalState::Rejected, .. })
        ));
    }
    assert!(gate.claim(request.id).is_err());
    assert_eq!(gate.audit_log().len(), 1);
}

#[test]
fn test_blocked_statement_never_reaches_executed() {
    let gate = gate(AutoApprovePolicy::LowRisk);
    let request = propose(&gate, "DROP TABLE products");
    assert_eq!(request.state, ApprovalState::Rejected);
    assert_eq!(request.history.len(), 1);
    assert_eq!(request.history[0].actor, Actor::Policy);

    assert!(gate.decide(request.id, Decision::Approve).is_err());
    assert!(gate.claim(request.id).is_err());
    assert!(gate.claim(request.id).is_err());

    let stored = gate.get(request.id).unwrap();
    assert_eq!(stored.state, ApprovalState::Rejected);
    assert!(stored.history.iter().all(|t| t.to != ApprovalState::Executed));
}

#[test]
fn test_zero_ttl_expires_on_first_access() {
    let gate = ApprovalGate::new(Duration::ZERO, AutoApprovePolicy::None, 10);
    let request = propose(&gate, "UPDATE products SET price = 1 WHERE product_id = 2");

    assert!(matches!(
        gate.decide(request.id, Decision::Approve),
        Err(WardenError::InvalidTransition { from: ApprovalState::Expired, .. })
    ));
    let stored = gate.get(request.id).unwrap();
    assert_eq!(stored.state, ApprovalState::Expired);
    assert_eq!(stored.history.last().map(|t| t.actor), Some(Actor::System));
}

#[test]
fn test_expire_stale_sweeps_pending_requests() {
    let gate = gate(AutoApprovePolicy::None);
    let first = propose(&gate, "SELECT * FROM products LIMIT 5");
    let second = propose(&gate, "INSERT INTO products (name) VALUES ('lamp')");
    assert_eq!(gate.expire_stale(), 0);

    let later = Utc::now() + chrono::Duration::seconds(301);
    assert_eq!(gate.expire_stale_at(later), 2);
    assert!(gate.pending().is_empty());
    for id in [first.id, second.id] {
        assert_eq!(gate.get(id).unwrap().state, ApprovalState::Expired);
    }
}

#[test]
fn test_audit_log_evicts_oldest_beyond_capacity() {
    let gate = ApprovalGate::new(Duration::from_secs(300), AutoApprovePolicy::None, 2);
    let ids: Vec<StatementId> = ["DROP TABLE a", "DROP TABLE b", "DROP TABLE c"]
        .iter()
        .map(|sql| propose(&gate, sql).id)
        .collect();

    let audit: Vec<StatementId> = gate.audit_log().iter().map(|r| r.id).collect();
    assert_eq!(audit, vec![ids[1], ids[2]]);
    assert!(matches!(gate.get(ids[0]), Err(WardenError::NotFound(id)) if id == ids[0]));
}

#[test]
fn test_unknown_id_is_not_found() {
    let gate = gate(AutoApprovePolicy::default());
    let id = StatementId::new();
    assert!(matches!(gate.get(id), Err(WardenError::NotFound(_))));
    assert!(matches!(gate.decide(id, Decision::Approve), Err(WardenError::NotFound(_))));
    assert!(matches!(gate.claim(id), Err(WardenError::NotFound(_))));
}

#[test]
fn test_concurrent_decisions_have_one_winner() {
    const THREADS: usize = 8;

    for _ in 0..20 {
        let gate = Arc::new(gate(AutoApprovePolicy::None));
        let id = propose(&gate, "DELETE FROM orders WHERE order_id = 9").id;
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                let decision = if i % 2 == 0 {
                    Decision::Approve
                } else {
                    Decision::Reject
                };
                thread::spawn(move || {
                    barrier.wait();
                    gate.decide(id, decision)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<ApprovalState> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
            r,
            Err(WardenError::InvalidTransition { .. })
        )));
        assert_eq!(gate.get(id).unwrap().state, winners[0]);
    }
}

#[test]
fn test_concurrent_claims_execute_once() {
    const THREADS: usize = 8;

    let gate = Arc::new(gate(AutoApprovePolicy::ReadOnly));
    let id = propose(&gate, "SELECT * FROM products LIMIT 10").id;
    assert_eq!(gate.get(id).unwrap().state, ApprovalState::Approved);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                gate.claim(id).is_ok()
            })
        })
        .collect();

    let claimed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(claimed, 1);
    assert_eq!(gate.get(id).unwrap().state, ApprovalState::Executed);
}
