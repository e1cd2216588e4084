//! Decision layer integration tests: tier actions, side effects, and the
//! second-approval workflow.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sacco_fraud_core::{
    decision_logic::{DecisionAction, DecisionFilter, FraudDecision},
    engine::FraudEngine,
    error::FraudError,
    member::{Member, MemberStatus, TransactionRecord, TransactionStatus, TransactionType},
    risk_scoring::RiskLevel,
    rule_catalog::Severity,
    types::PageRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_TXN: AtomicUsize = AtomicUsize::new(1);

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap()
}

fn add_member(engine: &FraudEngine, member_id: &str) {
    engine
        .store
        .insert_member(&Member {
            member_id: member_id.into(),
            member_number: format!("NO-{member_id}"),
            full_name: format!("Member {member_id}"),
            status: MemberStatus::Active,
            balance: 0.0,
            created_at: engine.now() - Duration::days(365),
        })
        .unwrap();
}

fn add_txn(engine: &FraudEngine, member_id: &str, txn_type: TransactionType, amount: f64, hours_ago: i64) -> String {
    let transaction_id = format!("txn-{}", NEXT_TXN.fetch_add(1, Ordering::SeqCst));
    engine
        .store
        .insert_transaction(&TransactionRecord {
            transaction_id: transaction_id.clone(),
            member_id: member_id.into(),
            txn_type,
            amount,
            status: TransactionStatus::Completed,
            reference: None,
            created_at: engine.now() - Duration::hours(hours_ago),
        })
        .unwrap();
    transaction_id
}

/// No deposits, five withdrawals in a day, one of them large: 25 + 20 + 15.
fn critical_member(engine: &FraudEngine, member_id: &str) -> String {
    add_member(engine, member_id);
    for h in [6, 5, 4, 3] {
        add_txn(engine, member_id, TransactionType::Withdrawal, 1_000.0, h);
    }
    add_txn(engine, member_id, TransactionType::Withdrawal, 150_000.0, 2)
}

/// No deposits, five modest withdrawals in a day: 25 + 20.
fn high_member(engine: &FraudEngine, member_id: &str) -> String {
    add_member(engine, member_id);
    for h in [10, 8, 6, 4] {
        add_txn(engine, member_id, TransactionType::Withdrawal, 2_000.0, h);
    }
    add_txn(engine, member_id, TransactionType::Withdrawal, 2_000.0, 1)
}

fn low_member(engine: &FraudEngine, member_id: &str) {
    add_member(engine, member_id);
    add_txn(engine, member_id, TransactionType::Deposit, 5_000.0, 48);
}

fn actions(decisions: &[FraudDecision]) -> Vec<DecisionAction> {
    decisions.iter().map(|d| d.action).collect()
}

fn approval_decision(engine: &FraudEngine, member_id: &str) -> FraudDecision {
    let evaluation = engine.evaluate(member_id, None).unwrap();
    evaluation
        .decisions
        .into_iter()
        .find(|d| d.requires_approval)
        .unwrap()
}

/// CRITICAL: alert, second approval, account flag; member flagged and an
/// alert opened.
#[test]
fn critical_member_gets_three_decisions_and_is_flagged() {
    let engine = FraudEngine::build_test(now()).unwrap();
    critical_member(&engine, "m-crit");

    let evaluation = engine.evaluate("m-crit", None).unwrap();
    assert_eq!(evaluation.risk_score.total_points, 60);
    assert_eq!(evaluation.risk_score.risk_level, RiskLevel::Critical);
    assert_eq!(
        actions(&evaluation.decisions),
        vec![
            DecisionAction::AlertTriggered,
            DecisionAction::SecondApprovalRequired,
            DecisionAction::AccountFlagged,
        ]
    );
    let pending: Vec<&FraudDecision> =
        evaluation.decisions.iter().filter(|d| d.requires_approval).collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].action, DecisionAction::SecondApprovalRequired);
    assert_eq!(pending[0].approved, None);

    let member = engine.get_member("m-crit").unwrap();
    assert_eq!(member.status, MemberStatus::Flagged);

    let alerts = engine.store.fraud_alerts_for_member("m-crit").unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].risk_score, 60);
}

/// HIGH: alert plus manual review; status untouched, HIGH severity alert.
#[test]
fn high_member_gets_manual_review() {
    let engine = FraudEngine::build_test(now()).unwrap();
    high_member(&engine, "m-high");

    let evaluation = engine.evaluate("m-high", None).unwrap();
    assert_eq!(evaluation.risk_score.risk_level, RiskLevel::High);
    assert_eq!(
        actions(&evaluation.decisions),
        vec![DecisionAction::AlertTriggered, DecisionAction::ManualReview]
    );
    assert!(evaluation.decisions.iter().all(|d| !d.requires_approval));
    assert_eq!(engine.get_member("m-high").unwrap().status, MemberStatus::Active);

    let alerts = engine.store.fraud_alerts_for_member("m-high").unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::High);
}

/// LOW: a single AUTO_APPROVED decision and no side effects.
#[test]
fn low_member_is_auto_approved() {
    let engine = FraudEngine::build_test(now()).unwrap();
    low_member(&engine, "m-low");

    let evaluation = engine.evaluate("m-low", None).unwrap();
    assert_eq!(actions(&evaluation.decisions), vec![DecisionAction::AutoApproved]);
    assert_eq!(engine.get_member("m-low").unwrap().status, MemberStatus::Active);
    assert!(engine.store.fraud_alerts_for_member("m-low").unwrap().is_empty());
}

/// Evaluating with one of the member's transactions flags that
/// transaction when the risk is elevated.
#[test]
fn elevated_evaluation_flags_the_transaction() {
    let engine = FraudEngine::build_test(now()).unwrap();
    let txn_id = high_member(&engine, "m-high");

    let evaluation = engine.evaluate("m-high", Some(&txn_id)).unwrap();
    assert!(evaluation
        .decisions
        .iter()
        .all(|d| d.transaction_id.as_deref() == Some(txn_id.as_str())));

    let txn = engine.store.get_transaction(&txn_id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Flagged);
}

/// Evaluating against a deposit leaves the deposit completed, so the next
/// recalculation scores the member the same.
#[test]
fn evaluating_against_a_deposit_keeps_the_score() {
    let engine = FraudEngine::build_test(now()).unwrap();
    add_member(&engine, "m-dep");
    let deposit = add_txn(&engine, "m-dep", TransactionType::Deposit, 5_000.0, 20);
    for h in [10, 8, 6, 4, 3, 2] {
        add_txn(&engine, "m-dep", TransactionType::Withdrawal, 2_000.0, h);
    }
    add_txn(&engine, "m-dep", TransactionType::Withdrawal, 150_000.0, 1);

    let before = engine.recalculate_member("m-dep").unwrap();
    assert!(before.risk_level.is_elevated(), "Expected elevated risk, got {before:?}");
    assert_eq!(before.no_deposit_points, 0);

    engine.evaluate("m-dep", Some(&deposit)).unwrap();
    let txn = engine.store.get_transaction(&deposit).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);

    let after = engine.recalculate_member("m-dep").unwrap();
    assert_eq!(after.no_deposit_points, 0);
    assert_eq!(after.total_points, before.total_points);
    assert_eq!(after.risk_level, before.risk_level);
}

/// Another member's transaction is rejected and nothing is recorded.
#[test]
fn foreign_transaction_is_rejected() {
    let engine = FraudEngine::build_test(now()).unwrap();
    high_member(&engine, "m-high");
    add_member(&engine, "m-other");
    let foreign = add_txn(&engine, "m-other", TransactionType::Withdrawal, 1_000.0, 1);

    let err = engine.evaluate("m-high", Some(&foreign)).unwrap_err();
    assert!(matches!(err, FraudError::Validation(_)), "Expected Validation, got {err}");

    let recorded = engine
        .list_decisions(&DecisionFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(recorded.total, 0);
}

/// Unknown members are NotFound.
#[test]
fn unknown_member_cannot_be_evaluated() {
    let engine = FraudEngine::build_test(now()).unwrap();
    let err = engine.evaluate("ghost", None).unwrap_err();
    assert!(matches!(err, FraudError::NotFound { .. }), "Expected NotFound, got {err}");
}

/// Evaluation prefers the stored score; without one it computes and
/// stores a fresh score.
#[test]
fn evaluation_uses_cached_score_when_present() {
    let engine = FraudEngine::build_test(now()).unwrap();
    low_member(&engine, "m-1");

    assert!(engine.store.get_risk_score("m-1").unwrap().is_none());
    engine.evaluate("m-1", None).unwrap();
    assert!(engine.store.get_risk_score("m-1").unwrap().is_some());

    // New evidence does not show until the next recalculation.
    for h in [10, 8, 6, 4, 2] {
        add_txn(&engine, "m-1", TransactionType::Withdrawal, 1_000.0, h);
    }
    let stale = engine.evaluate("m-1", None).unwrap();
    assert_eq!(stale.risk_score.total_points, 0);

    engine.recalculate_risk_scores().unwrap();
    let fresh = engine.evaluate("m-1", None).unwrap();
    assert_eq!(fresh.risk_score.total_points, 20);
}

// ── Approval workflow ─────────────────────────────────────────────────────

/// The first approval wins; a second attempt is InvalidState and leaves the
/// first outcome in place.
#[test]
fn approval_is_decided_once() {
    let engine = FraudEngine::build_test(now()).unwrap();
    critical_member(&engine, "m-crit");
    let pending = approval_decision(&engine, "m-crit");

    let approved = engine.approve_decision(&pending.decision_id, true, "supervisor-a").unwrap();
    assert_eq!(approved.approved, Some(true));
    assert_eq!(approved.approved_by.as_deref(), Some("supervisor-a"));
    assert_eq!(approved.approved_at, Some(now()));

    let err = engine
        .approve_decision(&pending.decision_id, false, "supervisor-b")
        .unwrap_err();
    assert!(matches!(err, FraudError::InvalidState(_)), "Expected InvalidState, got {err}");

    let current = engine.get_decision(&pending.decision_id).unwrap();
    assert_eq!(current.approved, Some(true));
    assert_eq!(current.approved_by.as_deref(), Some("supervisor-a"));
}

/// Revoking returns the decision to pending so it can be decided again.
#[test]
fn revoked_approval_can_be_decided_again() {
    let engine = FraudEngine::build_test(now()).unwrap();
    critical_member(&engine, "m-crit");
    let pending = approval_decision(&engine, "m-crit");

    engine.approve_decision(&pending.decision_id, true, "supervisor-a").unwrap();
    let revoked = engine.revoke_approval(&pending.decision_id, "supervisor-b").unwrap();
    assert_eq!(revoked.approved, None);
    assert_eq!(revoked.approved_by, None);
    assert_eq!(revoked.approved_at, None);

    let rejected = engine.approve_decision(&pending.decision_id, false, "supervisor-b").unwrap();
    assert_eq!(rejected.approved, Some(false));

    let audit = engine
        .list_audit_entries(Some("fraud_decision"), PageRequest::default())
        .unwrap();
    let trail: Vec<&str> = audit.items.iter().map(|e| e.action.as_str()).collect();
    // Newest first.
    assert_eq!(
        trail,
        vec!["DECISION_APPROVED", "DECISION_APPROVAL_REVOKED", "DECISION_APPROVED"]
    );
}

/// There is nothing to revoke on a pending decision.
#[test]
fn revoking_a_pending_decision_fails() {
    let engine = FraudEngine::build_test(now()).unwrap();
    critical_member(&engine, "m-crit");
    let pending = approval_decision(&engine, "m-crit");

    let err = engine.revoke_approval(&pending.decision_id, "ops").unwrap_err();
    assert!(matches!(err, FraudError::InvalidState(_)), "Expected InvalidState, got {err}");
}

/// Decisions that never required approval cannot be approved.
#[test]
fn non_approval_decision_cannot_be_approved() {
    let engine = FraudEngine::build_test(now()).unwrap();
    low_member(&engine, "m-low");
    let evaluation = engine.evaluate("m-low", None).unwrap();

    let err = engine
        .approve_decision(&evaluation.decisions[0].decision_id, true, "ops")
        .unwrap_err();
    assert!(matches!(err, FraudError::InvalidState(_)), "Expected InvalidState, got {err}");

    let err = engine.approve_decision("missing", true, "ops").unwrap_err();
    assert!(matches!(err, FraudError::NotFound { .. }), "Expected NotFound, got {err}");
}

/// The pending-approval filter tracks the approval lifecycle.
#[test]
fn pending_approval_filter_follows_lifecycle() {
    let engine = FraudEngine::build_test(now()).unwrap();
    critical_member(&engine, "m-crit");
    low_member(&engine, "m-low");
    let pending = approval_decision(&engine, "m-crit");
    engine.evaluate("m-low", None).unwrap();

    let waiting = DecisionFilter { pending_approval: Some(true), ..DecisionFilter::default() };
    let settled = DecisionFilter { pending_approval: Some(false), ..DecisionFilter::default() };

    let page = engine.list_decisions(&waiting, PageRequest::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].decision_id, pending.decision_id);
    assert_eq!(engine.list_decisions(&settled, PageRequest::default()).unwrap().total, 3);

    engine.approve_decision(&pending.decision_id, true, "ops").unwrap();
    assert_eq!(engine.list_decisions(&waiting, PageRequest::default()).unwrap().total, 0);
    assert_eq!(engine.list_decisions(&settled, PageRequest::default()).unwrap().total, 4);

    let by_member = DecisionFilter { member_id: Some("m-low".into()), ..DecisionFilter::default() };
    let page = engine.list_decisions(&by_member, PageRequest::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].action, DecisionAction::AutoApproved);
}
