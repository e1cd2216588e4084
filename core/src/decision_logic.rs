//! Decision logic layer.
//!
//! Maps a member's risk tier to concrete actions and records each one as an
//! immutable `FraudDecision`:
//!
//!   CRITICAL  ALERT_TRIGGERED, SECOND_APPROVAL_REQUIRED, ACCOUNT_FLAGGED
//!             (+ fraud alert, member status -> FLAGGED)
//!   HIGH      ALERT_TRIGGERED, MANUAL_REVIEW (+ fraud alert)
//!   MEDIUM    AUTO_APPROVED
//!   LOW       AUTO_APPROVED
//!
//! Only the approval fields of a decision ever change after it is written,
//! and only once: the first approve/reject wins until explicitly revoked.

use crate::{
    audit::AuditAction,
    engine::FraudEngine,
    error::{FraudError, FraudResult},
    member::{MemberStatus, TransactionStatus},
    risk_scoring::{MemberRiskScore, RiskLevel},
    rule_catalog::Severity,
    types::{EntityId, Page, PageRequest, SYSTEM_ACTOR},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    AlertTriggered,
    SecondApprovalRequired,
    TransactionBlocked,
    AccountFlagged,
    ManualReview,
    AutoApproved,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlertTriggered => "ALERT_TRIGGERED",
            Self::SecondApprovalRequired => "SECOND_APPROVAL_REQUIRED",
            Self::TransactionBlocked => "TRANSACTION_BLOCKED",
            Self::AccountFlagged => "ACCOUNT_FLAGGED",
            Self::ManualReview => "MANUAL_REVIEW",
            Self::AutoApproved => "AUTO_APPROVED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ALERT_TRIGGERED" => Some(Self::AlertTriggered),
            "SECOND_APPROVAL_REQUIRED" => Some(Self::SecondApprovalRequired),
            "TRANSACTION_BLOCKED" => Some(Self::TransactionBlocked),
            "ACCOUNT_FLAGGED" => Some(Self::AccountFlagged),
            "MANUAL_REVIEW" => Some(Self::ManualReview),
            "AUTO_APPROVED" => Some(Self::AutoApproved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudDecision {
    pub decision_id: EntityId,
    pub member_id: EntityId,
    pub transaction_id: Option<EntityId>,
    /// Score and level at the moment the decision was made.
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub action: DecisionAction,
    pub reason: String,
    pub requires_approval: bool,
    /// `None` while pending (or when no approval is required).
    pub approved: Option<bool>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Alert record handed to human triage for HIGH and CRITICAL members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub alert_id: EntityId,
    pub member_id: EntityId,
    pub transaction_id: Option<EntityId>,
    pub alert_type: String,
    pub severity: Severity,
    pub description: String,
    pub risk_score: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// An action the layer intends to record, before it gets an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDecision {
    pub action: DecisionAction,
    pub reason: String,
    pub requires_approval: bool,
}

impl PlannedDecision {
    fn new(action: DecisionAction, reason: String) -> Self {
        Self { action, reason, requires_approval: false }
    }
}

/// Deterministic tier -> actions mapping.
pub fn plan_decisions(level: RiskLevel, points: u32) -> Vec<PlannedDecision> {
    let mut planned = Vec::new();

    if level.is_elevated() {
        planned.push(PlannedDecision::new(
            DecisionAction::AlertTriggered,
            format!("{} risk level detected (score: {points})", level.as_str()),
        ));
    }

    match level {
        RiskLevel::Critical => {
            planned.push(PlannedDecision {
                action: DecisionAction::SecondApprovalRequired,
                reason: format!(
                    "Critical risk score of {points} requires a second approval before funds move"
                ),
                requires_approval: true,
            });
            planned.push(PlannedDecision::new(
                DecisionAction::AccountFlagged,
                format!("Account flagged due to critical risk score of {points}"),
            ));
        }
        RiskLevel::High => {
            planned.push(PlannedDecision::new(
                DecisionAction::ManualReview,
                format!("High risk score of {points} requires manual review"),
            ));
        }
        RiskLevel::Medium | RiskLevel::Low => {
            planned.push(PlannedDecision::new(
                DecisionAction::AutoApproved,
                format!(
                    "{} risk level (score: {points}) is within acceptable limits",
                    level.as_str()
                ),
            ));
        }
    }

    planned
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub risk_score: MemberRiskScore,
    pub decisions: Vec<FraudDecision>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionFilter {
    pub member_id: Option<EntityId>,
    pub action: Option<DecisionAction>,
    /// `Some(true)`: only decisions still waiting for approval.
    pub pending_approval: Option<bool>,
}

impl FraudEngine {
    /// Evaluate a member (optionally in the context of one transaction) and
    /// record the resulting decisions. All writes happen in one transaction.
    pub fn evaluate(&self, member_id: &str, transaction_id: Option<&str>) -> FraudResult<Evaluation> {
        let member = self.get_member(member_id)?;
        let transaction = match transaction_id {
            Some(txn_id) => {
                let txn = self
                    .store
                    .get_transaction(txn_id)?
                    .ok_or_else(|| FraudError::not_found("Transaction", txn_id))?;
                if txn.member_id != member.member_id {
                    return Err(FraudError::validation(format!(
                        "transaction {txn_id} does not belong to member {member_id}"
                    )));
                }
                Some(txn)
            }
            None => None,
        };

        let now = self.now();
        let evaluation = self.store.atomically(|| {
            let score = self.current_or_fresh_score(&member.member_id)?;
            let mut decisions = Vec::new();

            for planned in plan_decisions(score.risk_level, score.total_points) {
                let decision = FraudDecision {
                    decision_id: uuid::Uuid::new_v4().to_string(),
                    member_id: member.member_id.clone(),
                    transaction_id: transaction_id.map(str::to_string),
                    risk_score: score.total_points,
                    risk_level: score.risk_level,
                    action: planned.action,
                    reason: planned.reason,
                    requires_approval: planned.requires_approval,
                    approved: None,
                    approved_by: None,
                    approved_at: None,
                    created_at: now,
                };
                self.store.insert_decision(&decision)?;
                decisions.push(decision);
            }

            if score.risk_level.is_elevated() {
                let severity = match score.risk_level {
                    RiskLevel::Critical => Severity::Critical,
                    _ => Severity::High,
                };
                self.store.insert_fraud_alert(&FraudAlert {
                    alert_id: uuid::Uuid::new_v4().to_string(),
                    member_id: member.member_id.clone(),
                    transaction_id: transaction_id.map(str::to_string),
                    alert_type: "RISK_SCORE".into(),
                    severity,
                    description: format!(
                        "Member {} reached {} risk with {} points",
                        member.member_number,
                        score.risk_level.as_str(),
                        score.total_points
                    ),
                    risk_score: score.total_points,
                    status: "OPEN".into(),
                    created_at: now,
                })?;
                // Deposits keep their status.
                if let Some(txn) = transaction.as_ref().filter(|t| t.is_withdrawal()) {
                    self.store
                        .set_transaction_status(&txn.transaction_id, TransactionStatus::Flagged)?;
                }
            }

            if score.risk_level == RiskLevel::Critical {
                self.store.set_member_status(&member.member_id, MemberStatus::Flagged)?;
            }

            Ok(Evaluation { risk_score: score, decisions })
        })?;

        let actions: Vec<&str> = evaluation.decisions.iter().map(|d| d.action.as_str()).collect();
        log::info!(
            "Member {} evaluated at {} ({} points): {}",
            member.member_id,
            evaluation.risk_score.risk_level.as_str(),
            evaluation.risk_score.total_points,
            actions.join(", ")
        );
        self.audit(
            SYSTEM_ACTOR,
            AuditAction::FraudEvaluated,
            "member",
            Some(&member.member_id),
            serde_json::json!({
                "risk_score": evaluation.risk_score.total_points,
                "risk_level": evaluation.risk_score.risk_level,
                "transaction_id": transaction_id,
                "actions": actions,
            }),
        );
        if evaluation.risk_score.risk_level == RiskLevel::Critical {
            self.audit(
                SYSTEM_ACTOR,
                AuditAction::AccountFlagged,
                "member",
                Some(&member.member_id),
                serde_json::json!({ "previous_status": member.status }),
            );
        }
        Ok(evaluation)
    }

    pub fn get_decision(&self, decision_id: &str) -> FraudResult<FraudDecision> {
        self.store
            .get_decision(decision_id)?
            .ok_or_else(|| FraudError::not_found("Decision", decision_id))
    }

    pub fn list_decisions(
        &self,
        filter: &DecisionFilter,
        page: PageRequest,
    ) -> FraudResult<Page<FraudDecision>> {
        let page = self.page(page);
        let (items, total) = self.store.list_decisions(filter, page)?;
        Ok(Page::new(items, total, page))
    }

    /// Approve or reject a decision that requires approval. First decision
    /// wins: a second call is rejected until `revoke_approval` is used.
    pub fn approve_decision(
        &self,
        decision_id: &str,
        approved: bool,
        approver: &str,
    ) -> FraudResult<FraudDecision> {
        let changed = self
            .store
            .set_decision_approval(decision_id, approved, approver, self.now())?;
        if changed == 0 {
            let current = self.get_decision(decision_id)?;
            if !current.requires_approval {
                return Err(FraudError::invalid_state(format!(
                    "decision {decision_id} ({}) does not require approval",
                    current.action.as_str()
                )));
            }
            return Err(FraudError::invalid_state(format!(
                "decision {decision_id} was already {} by {}",
                if current.approved == Some(true) { "approved" } else { "rejected" },
                current.approved_by.as_deref().unwrap_or("unknown")
            )));
        }

        let decision = self.get_decision(decision_id)?;
        self.audit(
            approver,
            AuditAction::DecisionApproved,
            "fraud_decision",
            Some(decision_id),
            serde_json::json!({ "approved": approved, "member_id": decision.member_id }),
        );
        Ok(decision)
    }

    /// Return a decided approval to pending so it can be decided again.
    pub fn revoke_approval(&self, decision_id: &str, actor: &str) -> FraudResult<FraudDecision> {
        let previous = self.get_decision(decision_id)?;
        let changed = self.store.clear_decision_approval(decision_id)?;
        if changed == 0 {
            return Err(FraudError::invalid_state(format!(
                "decision {decision_id} has no approval to revoke"
            )));
        }
        let decision = self.get_decision(decision_id)?;
        self.audit(
            actor,
            AuditAction::DecisionApprovalRevoked,
            "fraud_decision",
            Some(decision_id),
            serde_json::json!({
                "previous_approved": previous.approved,
                "previous_approved_by": previous.approved_by,
            }),
        );
        Ok(decision)
    }
}
