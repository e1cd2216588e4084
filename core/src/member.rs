//! Member and transaction records owned by the back-office ledger.
//!
//! The fraud pipeline reads these and writes exactly two things back:
//! a member's status (FLAGGED) and a transaction's status (FLAGGED).

use crate::{
    engine::FraudEngine,
    error::{FraudError, FraudResult},
    types::EntityId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Active,
    Inactive,
    Suspended,
    Flagged,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Flagged => "FLAGGED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            "SUSPENDED" => Some(Self::Suspended),
            "FLAGGED" => Some(Self::Flagged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: EntityId,
    pub member_number: String,
    pub full_name: String,
    pub status: MemberStatus,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    LoanDisbursement,
    LoanRepayment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::LoanDisbursement => "LOAN_DISBURSEMENT",
            Self::LoanRepayment => "LOAN_REPAYMENT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DEPOSIT" => Some(Self::Deposit),
            "WITHDRAWAL" => Some(Self::Withdrawal),
            "LOAN_DISBURSEMENT" => Some(Self::LoanDisbursement),
            "LOAN_REPAYMENT" => Some(Self::LoanRepayment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Flagged,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Flagged => "FLAGGED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "FLAGGED" => Some(Self::Flagged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: EntityId,
    pub member_id: EntityId,
    pub txn_type: TransactionType,
    pub amount: f64,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn is_withdrawal(&self) -> bool {
        self.txn_type == TransactionType::Withdrawal
    }

    pub fn is_deposit(&self) -> bool {
        self.txn_type == TransactionType::Deposit
    }

    pub fn is_completed_deposit(&self) -> bool {
        self.is_deposit() && self.status == TransactionStatus::Completed
    }
}

impl FraudEngine {
    pub fn get_member(&self, member_id: &str) -> FraudResult<Member> {
        self.store
            .get_member(member_id)?
            .ok_or_else(|| FraudError::not_found("Member", member_id))
    }
}
