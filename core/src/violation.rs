//! Rule violations — evidence records produced by the rule engine.
//!
//! A violation is immutable apart from its review fields. `risk_points` is
//! copied from the rule when the violation is created, so later edits to
//! the rule do not rewrite history.

use crate::{
    audit::AuditAction,
    engine::FraudEngine,
    error::{FraudError, FraudResult},
    types::{EntityId, Page, PageRequest},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub violation_id: EntityId,
    pub rule_id: EntityId,
    pub rule_name: String,
    pub member_id: EntityId,
    pub transaction_id: Option<EntityId>,
    pub details: String,
    pub risk_points: u32,
    pub reviewed: bool,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A violation about to be written, with the natural key it dedups on.
#[derive(Debug, Clone)]
pub struct NewViolation {
    pub violation: RuleViolation,
    pub dedup_key: String,
    /// When set, skip the insert if the same (rule, member) already has a
    /// violation created at or after this instant.
    pub not_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationFilter {
    pub rule_id: Option<EntityId>,
    pub member_id: Option<EntityId>,
    pub reviewed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReview {
    pub reviewed: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FraudEngine {
    pub fn list_violations(
        &self,
        filter: &ViolationFilter,
        page: PageRequest,
    ) -> FraudResult<Page<RuleViolation>> {
        let page = self.page(page);
        let (items, total) = self.store.list_violations(filter, page)?;
        Ok(Page::new(items, total, page))
    }

    pub fn get_violation(&self, violation_id: &str) -> FraudResult<RuleViolation> {
        self.store
            .get_violation(violation_id)?
            .ok_or_else(|| FraudError::not_found("Violation", violation_id))
    }

    /// Record a human review. Reviewing again overwrites the review fields
    /// with the same meaning, so repeated calls are harmless.
    pub fn review_violation(
        &self,
        violation_id: &str,
        review: ViolationReview,
        reviewer: &str,
    ) -> FraudResult<RuleViolation> {
        let now = self.now();
        let changed = self.store.review_violation(
            violation_id,
            review.reviewed,
            review.notes.as_deref(),
            reviewer,
            now,
        )?;
        if changed == 0 {
            return Err(FraudError::not_found("Violation", violation_id));
        }
        let violation = self.get_violation(violation_id)?;
        self.audit(
            reviewer,
            AuditAction::ViolationReviewed,
            "rule_violation",
            Some(violation_id),
            serde_json::json!({ "reviewed": review.reviewed, "notes": review.notes }),
        );
        Ok(violation)
    }
}
