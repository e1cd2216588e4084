//! Full pipeline: seed catalog, rule run, scoring, decisions, scan, stats.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sacco_fraud_core::{
    clock::EngineClock,
    config::EngineConfig,
    decision_logic::DecisionAction,
    engine::FraudEngine,
    member::{Member, MemberStatus, TransactionRecord, TransactionStatus, TransactionType},
    risk_scoring::RiskLevel,
    rule_catalog::RuleType,
    store::FraudStore,
    types::{PageRequest, SYSTEM_ACTOR},
    violation::ViolationFilter,
};
use std::collections::HashSet;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap()
}

/// Engine with the default seed catalog installed.
fn seeded_engine() -> FraudEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = FraudEngine::build(FraudStore::in_memory().unwrap(), EngineConfig::default())
        .unwrap()
        .with_clock(EngineClock::Fixed(now()));
    engine.bootstrap(SYSTEM_ACTOR).unwrap();
    engine
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
            created_at: now() - Duration::days(200),
        })
        .unwrap();
}

fn add_txn(engine: &FraudEngine, id: &str, member_id: &str, txn_type: TransactionType, amount: f64, hours_ago: i64) {
    engine
        .store
        .insert_transaction(&TransactionRecord {
            transaction_id: id.into(),
            member_id: member_id.into(),
            txn_type,
            amount,
            status: TransactionStatus::Completed,
            reference: None,
            created_at: now() - Duration::hours(hours_ago),
        })
        .unwrap();
}

/// Five withdrawals inside 18 hours, none above the large threshold, no
/// deposits ever: one FREQUENCY and one NO_DEPOSIT violation, 45 points,
/// HIGH, alert plus manual review.
#[test]
fn withdrawal_burst_without_deposits_lands_in_manual_review() {
    let engine = seeded_engine();
    add_member(&engine, "m-1");
    for (i, (amount, hours_ago)) in [(25_000.0, 18), (20_000.0, 14), (5_000.0, 10), (15_000.0, 5), (30_000.0, 1)]
        .into_iter()
        .enumerate()
    {
        add_txn(&engine, &format!("w-{i}"), "m-1", TransactionType::Withdrawal, amount, hours_ago);
    }

    let report = engine.run_rules().unwrap();
    assert_eq!(report.rules_evaluated, 3);
    assert_eq!(report.new_violations, 2, "Expected 2 violations, got {report:?}");

    let rules = engine.list_rules().unwrap();
    let violations = engine
        .list_violations(&ViolationFilter::default(), PageRequest::default())
        .unwrap();
    let fired: HashSet<RuleType> = violations
        .items
        .iter()
        .map(|v| {
            rules
                .iter()
                .find(|r| r.rule_id == v.rule_id)
                .map(|r| r.kind.rule_type())
                .unwrap()
        })
        .collect();
    assert_eq!(fired, HashSet::from([RuleType::Frequency, RuleType::NoDeposit]));

    engine.recalculate_risk_scores().unwrap();
    let score = engine.store.get_risk_score("m-1").unwrap().unwrap();
    assert_eq!(score.frequency_points, 20);
    assert_eq!(score.no_deposit_points, 25);
    assert_eq!(score.amount_points, 0);
    assert_eq!(score.behavior_points, 0);
    assert_eq!(score.total_points, 45);
    assert_eq!(score.risk_level, RiskLevel::High);

    let evaluation = engine.evaluate("m-1", None).unwrap();
    let actions: HashSet<DecisionAction> = evaluation.decisions.iter().map(|d| d.action).collect();
    assert_eq!(
        actions,
        HashSet::from([DecisionAction::AlertTriggered, DecisionAction::ManualReview])
    );
    assert!(evaluation.decisions.iter().all(|d| d.risk_score == 45));

    // A second run over the same data changes nothing.
    assert_eq!(engine.run_rules().unwrap().new_violations, 0);
}

/// A full scan covers every member and the stats reflect the outcome.
#[test]
fn scan_evaluates_every_member_and_updates_stats() {
    let engine = seeded_engine();

    add_member(&engine, "steady");
    add_txn(&engine, "s-d1", "steady", TransactionType::Deposit, 10_000.0, 24 * 10);
    add_txn(&engine, "s-w1", "steady", TransactionType::Withdrawal, 2_000.0, 24 * 2);

    add_member(&engine, "burst");
    for (i, h) in [6, 5, 4, 3].into_iter().enumerate() {
        add_txn(&engine, &format!("b-w{i}"), "burst", TransactionType::Withdrawal, 1_000.0, h);
    }
    add_txn(&engine, "b-big", "burst", TransactionType::Withdrawal, 150_000.0, 2);

    let scan = engine.run_scan().unwrap();
    assert_eq!(scan.rules.rules_evaluated, 3);
    // FREQUENCY + AMOUNT + NO_DEPOSIT for the burst member.
    assert_eq!(scan.rules.new_violations, 3);
    assert_eq!(scan.recalculation.members_processed, 2);
    assert_eq!(scan.members_evaluated, 2);
    // steady: AUTO_APPROVED; burst (60, CRITICAL): three decisions.
    assert_eq!(scan.decisions_recorded, 4);
    assert_eq!(scan.members_flagged, 1);

    assert_eq!(engine.get_member("burst").unwrap().status, MemberStatus::Flagged);
    assert_eq!(engine.get_member("steady").unwrap().status, MemberStatus::Active);

    let stats = engine.get_engine_stats().unwrap();
    assert_eq!(stats.rules_total, 3);
    assert_eq!(stats.violations_total, 3);
    assert_eq!(stats.violations_unreviewed, 3);
    assert_eq!(stats.members_low_risk, 1);
    assert_eq!(stats.members_critical_risk, 1);
    assert_eq!(stats.decisions_total, 4);
    assert_eq!(stats.decisions_pending_approval, 1);
    assert_eq!(stats.fraud_alerts_open, 1);

    let evaluated = engine
        .list_audit_entries(Some("member"), PageRequest::new(1, 100))
        .unwrap();
    let fraud_evaluated = evaluated
        .items
        .iter()
        .filter(|e| e.action == "FRAUD_EVALUATED")
        .count();
    let flagged = evaluated
        .items
        .iter()
        .filter(|e| e.action == "ACCOUNT_FLAGGED")
        .count();
    assert_eq!(fraud_evaluated, 2);
    assert_eq!(flagged, 1);
}

/// Reviewing a violation updates the unreviewed count.
#[test]
fn violation_review_is_recorded() {
    use sacco_fraud_core::violation::ViolationReview;

    let engine = seeded_engine();
    add_member(&engine, "m-1");
    add_txn(&engine, "w-1", "m-1", TransactionType::Withdrawal, 1_000.0, 3);
    engine.run_rules().unwrap();

    let page = engine
        .list_violations(&ViolationFilter::default(), PageRequest::default())
        .unwrap();
    assert_eq!(page.total, 1);
    let reviewed = engine
        .review_violation(
            &page.items[0].violation_id,
            ViolationReview { reviewed: true, notes: Some("Member paid in cash at branch".into()) },
            "investigator",
        )
        .unwrap();
    assert!(reviewed.reviewed);
    assert_eq!(reviewed.reviewed_by.as_deref(), Some("investigator"));
    assert_eq!(reviewed.reviewed_at, Some(now()));

    let unreviewed = ViolationFilter { reviewed: Some(false), ..ViolationFilter::default() };
    assert_eq!(
        engine.list_violations(&unreviewed, PageRequest::default()).unwrap().total,
        0
    );
    assert_eq!(engine.get_engine_stats().unwrap().violations_unreviewed, 0);
}
