//! Audit sink.
//!
//! Every consequential change the pipeline makes is mirrored here. A failed
//! audit write is logged and swallowed: it never fails or rolls back the
//! operation that produced it.

use crate::{
    engine::FraudEngine,
    error::FraudResult,
    types::{Page, PageRequest},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audited actions. Append only; the stored names are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RuleCreated,
    RuleUpdated,
    RuleDeleted,
    RulesRun,
    ViolationCreated,
    ViolationReviewed,
    ThresholdsUpdated,
    WithdrawalRequested,
    WithdrawalReviewed,
    RiskScoresRecalculated,
    FraudEvaluated,
    AccountFlagged,
    DecisionApproved,
    DecisionApprovalRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleCreated => "RULE_CREATED",
            Self::RuleUpdated => "RULE_UPDATED",
            Self::RuleDeleted => "RULE_DELETED",
            Self::RulesRun => "RULES_RUN",
            Self::ViolationCreated => "VIOLATION_CREATED",
            Self::ViolationReviewed => "VIOLATION_REVIEWED",
            Self::ThresholdsUpdated => "THRESHOLDS_UPDATED",
            Self::WithdrawalRequested => "WITHDRAWAL_REQUESTED",
            Self::WithdrawalReviewed => "WITHDRAWAL_REVIEWED",
            Self::RiskScoresRecalculated => "RISK_SCORES_RECALCULATED",
            Self::FraudEvaluated => "FRAUD_EVALUATED",
            Self::AccountFlagged => "ACCOUNT_FLAGGED",
            Self::DecisionApproved => "DECISION_APPROVED",
            Self::DecisionApprovalRevoked => "DECISION_APPROVAL_REVOKED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: Option<i64>,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl FraudEngine {
    pub(crate) fn audit(
        &self,
        actor: &str,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<&str>,
        details: serde_json::Value,
    ) {
        let entry = AuditEntry {
            audit_id: None,
            actor: actor.to_string(),
            action: action.as_str().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            details,
            created_at: self.now(),
        };
        if let Err(e) = self.store.append_audit(&entry) {
            log::warn!(
                "Audit write failed for {} on {entity_type} {:?}: {e}",
                action.as_str(),
                entity_id
            );
        }
    }

    pub fn list_audit_entries(
        &self,
        entity_type: Option<&str>,
        page: PageRequest,
    ) -> FraudResult<Page<AuditEntry>> {
        let page = self.page(page);
        let (items, total) = self.store.list_audit(entity_type, page)?;
        Ok(Page::new(items, total, page))
    }
}
