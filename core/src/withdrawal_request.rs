//! Large-withdrawal requests awaiting sign-off.
//!
//! PENDING -> APPROVED | REJECTED. Both outcomes are terminal; the review
//! is one conditional UPDATE so two concurrent reviewers cannot both win.

use crate::{
    audit::AuditAction,
    engine::FraudEngine,
    error::{FraudError, FraudResult},
    types::{EntityId, Page, PageRequest},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub request_id: EntityId,
    pub reference: String,
    pub member_id: EntityId,
    pub amount: f64,
    pub reason: String,
    pub document_url: Option<String>,
    pub status: WithdrawalStatus,
    pub requested_by: String,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequestSpec {
    pub member_id: EntityId,
    pub amount: f64,
    pub reason: String,
    #[serde(default)]
    pub document_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReview {
    pub status: WithdrawalStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequestFilter {
    pub status: Option<WithdrawalStatus>,
    pub member_id: Option<EntityId>,
}

fn new_reference() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("WR-{}", raw[..8].to_uppercase())
}

impl FraudEngine {
    pub fn list_withdrawal_requests(
        &self,
        filter: &WithdrawalRequestFilter,
        page: PageRequest,
    ) -> FraudResult<Page<WithdrawalRequest>> {
        let page = self.page(page);
        let (items, total) = self.store.list_withdrawal_requests(filter, page)?;
        Ok(Page::new(items, total, page))
    }

    pub fn get_withdrawal_request(&self, request_id: &str) -> FraudResult<WithdrawalRequest> {
        self.store
            .get_withdrawal_request(request_id)?
            .ok_or_else(|| FraudError::not_found("Withdrawal request", request_id))
    }

    pub fn create_withdrawal_request(
        &self,
        spec: WithdrawalRequestSpec,
        actor: &str,
    ) -> FraudResult<WithdrawalRequest> {
        if !spec.amount.is_finite() || spec.amount <= 0.0 {
            return Err(FraudError::validation(format!(
                "withdrawal amount must be positive, got {}",
                spec.amount
            )));
        }
        if spec.reason.trim().is_empty() {
            return Err(FraudError::validation("withdrawal reason must not be empty"));
        }
        let member = self.get_member(&spec.member_id)?;

        let request = WithdrawalRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            reference: new_reference(),
            member_id: member.member_id,
            amount: spec.amount,
            reason: spec.reason.trim().to_string(),
            document_url: spec.document_url,
            status: WithdrawalStatus::Pending,
            requested_by: actor.to_string(),
            reviewed_by: None,
            review_notes: None,
            reviewed_at: None,
            created_at: self.now(),
        };
        self.store.insert_withdrawal_request(&request)?;

        let thresholds = self.get_thresholds()?;
        if request.amount > thresholds.require_approval_above {
            log::info!(
                "Withdrawal request {} for {:.2} is above the approval trigger of {:.2}",
                request.reference,
                request.amount,
                thresholds.require_approval_above
            );
        }
        self.audit(
            actor,
            AuditAction::WithdrawalRequested,
            "withdrawal_request",
            Some(&request.request_id),
            serde_json::json!({
                "reference": request.reference,
                "member_id": request.member_id,
                "amount": request.amount,
            }),
        );
        Ok(request)
    }

    pub fn review_withdrawal_request(
        &self,
        request_id: &str,
        review: WithdrawalReview,
        reviewer: &str,
    ) -> FraudResult<WithdrawalRequest> {
        if !review.status.is_terminal() {
            return Err(FraudError::validation(
                "a review must set the status to APPROVED or REJECTED",
            ));
        }
        let changed = self.store.resolve_withdrawal_request(
            request_id,
            review.status,
            review.notes.as_deref(),
            reviewer,
            self.now(),
        )?;
        if changed == 0 {
            let current = self.get_withdrawal_request(request_id)?;
            return Err(FraudError::invalid_state(format!(
                "withdrawal request {} is already {}",
                current.reference,
                current.status.as_str()
            )));
        }
        let request = self.get_withdrawal_request(request_id)?;
        self.audit(
            reviewer,
            AuditAction::WithdrawalReviewed,
            "withdrawal_request",
            Some(request_id),
            serde_json::json!({
                "reference": request.reference,
                "status": request.status,
                "notes": request.review_notes,
            }),
        );
        Ok(request)
    }
}
