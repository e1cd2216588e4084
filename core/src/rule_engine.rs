//! Rule evaluation engine.
//!
//! Scans persisted transactions against every enabled rule and records
//! deduplicated violations.
//!
//! RULES:
//!   - `now` is read once per run and shared by every rule's window math.
//!   - Each rule runs in its own SQLite transaction. A failing rule is
//!     rolled back, logged and counted; the remaining rules still run.
//!   - Dedup lives in storage: a unique (rule, member, dedup_key) index plus
//!     a conditional insert. Re-running a scan never double-counts.
//!   - Nothing here touches members or transactions.

use crate::{
    audit::AuditAction,
    engine::FraudEngine,
    error::FraudResult,
    rule_catalog::{FraudRule, RuleKind},
    store::FraudStore,
    threshold::WithdrawalThreshold,
    types::{EntityId, SYSTEM_ACTOR},
    violation::{NewViolation, RuleViolation},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Read-only view handed to custom evaluators.
pub struct RuleContext<'a> {
    pub store: &'a FraudStore,
    pub thresholds: &'a WithdrawalThreshold,
    pub now: DateTime<Utc>,
}

/// A violation proposed by a custom evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationCandidate {
    pub member_id: EntityId,
    pub transaction_id: Option<EntityId>,
    pub details: String,
    /// The evaluator's natural key; the same key is never recorded twice
    /// for one (rule, member).
    pub dedup_key: String,
}

/// Evaluation strategy for CUSTOM rules, registered by name on the engine.
pub trait CustomRuleEvaluator: Send {
    /// Stable name CUSTOM rules refer to in their `evaluator` field.
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        params: &serde_json::Value,
    ) -> FraudResult<Vec<ViolationCandidate>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule_id: EntityId,
    pub rule_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRunReport {
    pub new_violations: usize,
    pub rules_evaluated: usize,
    pub rules_failed: usize,
    pub failures: Vec<RuleFailure>,
}

impl FraudEngine {
    /// Evaluate every enabled rule once.
    pub fn run_rules(&self) -> FraudResult<RuleRunReport> {
        let now = self.now();
        let thresholds = self.get_thresholds()?;
        let rules = self.store.enabled_rules()?;

        let mut report = RuleRunReport {
            new_violations: 0,
            rules_evaluated: 0,
            rules_failed: 0,
            failures: Vec::new(),
        };

        for rule in &rules {
            let outcome = self
                .store
                .atomically(|| self.evaluate_rule(rule, &thresholds, now));
            match outcome {
                Ok(created) => {
                    log::debug!("Rule '{}' produced {} new violations", rule.name, created.len());
                    report.rules_evaluated += 1;
                    report.new_violations += created.len();
                    for violation in &created {
                        self.audit(
                            SYSTEM_ACTOR,
                            AuditAction::ViolationCreated,
                            "rule_violation",
                            Some(&violation.violation_id),
                            serde_json::json!({
                                "rule_id": violation.rule_id,
                                "member_id": violation.member_id,
                                "transaction_id": violation.transaction_id,
                                "risk_points": violation.risk_points,
                            }),
                        );
                    }
                }
                Err(e) => {
                    log::error!("Rule '{}' ({}) failed: {e}", rule.name, rule.rule_id);
                    report.rules_failed += 1;
                    report.failures.push(RuleFailure {
                        rule_id: rule.rule_id.clone(),
                        rule_name: rule.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Rule run complete: {} rules evaluated, {} failed, {} new violations",
            report.rules_evaluated,
            report.rules_failed,
            report.new_violations
        );
        self.audit(
            SYSTEM_ACTOR,
            AuditAction::RulesRun,
            "fraud_rule",
            None,
            serde_json::to_value(&report)?,
        );
        Ok(report)
    }

    fn evaluate_rule(
        &self,
        rule: &FraudRule,
        thresholds: &WithdrawalThreshold,
        now: DateTime<Utc>,
    ) -> FraudResult<Vec<RuleViolation>> {
        match &rule.kind {
            RuleKind::Frequency { max_count, window_hours } => {
                self.evaluate_frequency(rule, *max_count, *window_hours, now)
            }
            RuleKind::Amount { max_amount, .. } => {
                self.evaluate_amount(rule, *max_amount, thresholds, now)
            }
            RuleKind::NoDeposit => self.evaluate_no_deposit(rule, now),
            RuleKind::Custom { evaluator, params } => {
                self.evaluate_custom(rule, evaluator, params, thresholds, now)
            }
        }
    }

    /// Members with more than `max_count` non-failed withdrawals in the
    /// trailing window; at most one violation per (rule, member) per window.
    fn evaluate_frequency(
        &self,
        rule: &FraudRule,
        max_count: u32,
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> FraudResult<Vec<RuleViolation>> {
        let window_start = now - Duration::hours(window_hours as i64);
        let bucket = now.timestamp() / (window_hours as i64 * 3600);
        let bursts = self.store.withdrawal_bursts(window_start, now, max_count)?;

        let mut created = Vec::new();
        for burst in bursts {
            let details = format!(
                "{} withdrawals within {window_hours}h exceeds the limit of {max_count}",
                burst.withdrawal_count
            );
            let draft = NewViolation {
                violation: new_violation(rule, &burst.member_id, Some(burst.latest_transaction_id), details, now),
                dedup_key: format!("window:{bucket}"),
                not_since: Some(window_start),
            };
            if self.store.insert_violation(&draft)? {
                created.push(draft.violation);
            }
        }
        Ok(created)
    }

    /// One violation per (rule, transaction) for each non-failed withdrawal
    /// at or above the ceiling.
    fn evaluate_amount(
        &self,
        rule: &FraudRule,
        max_amount: Option<f64>,
        thresholds: &WithdrawalThreshold,
        now: DateTime<Utc>,
    ) -> FraudResult<Vec<RuleViolation>> {
        let ceiling = max_amount.unwrap_or(thresholds.large_withdrawal_amount);
        let withdrawals = self
            .store
            .large_withdrawals_without_violation(&rule.rule_id, ceiling)?;

        let mut created = Vec::new();
        for txn in withdrawals {
            let details = format!(
                "Withdrawal of {:.2} meets or exceeds the limit of {:.2}",
                txn.amount, ceiling
            );
            let draft = NewViolation {
                violation: new_violation(rule, &txn.member_id, Some(txn.transaction_id.clone()), details, now),
                dedup_key: format!("txn:{}", txn.transaction_id),
                not_since: None,
            };
            if self.store.insert_violation(&draft)? {
                created.push(draft.violation);
            }
        }
        Ok(created)
    }

    /// Exactly one violation per member who withdraws but has never
    /// completed a deposit.
    fn evaluate_no_deposit(&self, rule: &FraudRule, now: DateTime<Utc>) -> FraudResult<Vec<RuleViolation>> {
        let members = self.store.members_without_deposits(&rule.rule_id)?;

        let mut created = Vec::new();
        for member in members {
            let details = format!(
                "{} withdrawals on record with no completed deposit",
                member.withdrawal_count
            );
            let draft = NewViolation {
                violation: new_violation(rule, &member.member_id, Some(member.latest_transaction_id), details, now),
                dedup_key: "member".to_string(),
                not_since: None,
            };
            if self.store.insert_violation(&draft)? {
                created.push(draft.violation);
            }
        }
        Ok(created)
    }

    fn evaluate_custom(
        &self,
        rule: &FraudRule,
        evaluator: &str,
        params: &serde_json::Value,
        thresholds: &WithdrawalThreshold,
        now: DateTime<Utc>,
    ) -> FraudResult<Vec<RuleViolation>> {
        let Some(custom) = self.custom_evaluator(evaluator) else {
            log::warn!(
                "Rule '{}' names evaluator '{evaluator}' but none is registered; skipping",
                rule.name
            );
            return Ok(Vec::new());
        };

        let ctx = RuleContext { store: &self.store, thresholds, now };
        let candidates = custom.evaluate(&ctx, params)?;

        let mut created = Vec::new();
        for candidate in candidates {
            let draft = NewViolation {
                violation: new_violation(rule, &candidate.member_id, candidate.transaction_id, candidate.details, now),
                dedup_key: format!("custom:{}", candidate.dedup_key),
                not_since: None,
            };
            if self.store.insert_violation(&draft)? {
                created.push(draft.violation);
            }
        }
        Ok(created)
    }
}

fn new_violation(
    rule: &FraudRule,
    member_id: &str,
    transaction_id: Option<EntityId>,
    details: String,
    now: DateTime<Utc>,
) -> RuleViolation {
    RuleViolation {
        violation_id: uuid::Uuid::new_v4().to_string(),
        rule_id: rule.rule_id.clone(),
        rule_name: rule.name.clone(),
        member_id: member_id.to_string(),
        transaction_id,
        details,
        risk_points: rule.risk_points,
        reviewed: false,
        reviewed_by: None,
        review_notes: None,
        reviewed_at: None,
        created_at: now,
    }
}
