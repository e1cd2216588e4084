//! Withdrawal thresholds — operator-adjustable limits read by the rule
//! engine and the risk scorer.
//!
//! Every change appends a new row; the most recently updated row is the
//! current configuration. With no row saved, the configured defaults apply.

use crate::{
    audit::AuditAction,
    engine::FraudEngine,
    error::{FraudError, FraudResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LARGE_WITHDRAWAL_AMOUNT: f64 = 100_000.0;
pub const DEFAULT_DAILY_WITHDRAWAL_LIMIT: f64 = 500_000.0;
pub const DEFAULT_MAX_WITHDRAWALS_PER_DAY: u32 = 5;
pub const DEFAULT_REQUIRE_APPROVAL_ABOVE: f64 = 200_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalThreshold {
    /// `None` when the values come from configuration defaults.
    pub threshold_id: Option<i64>,
    pub large_withdrawal_amount: f64,
    pub daily_withdrawal_limit: f64,
    pub max_withdrawals_per_day: u32,
    pub require_approval_above: f64,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WithdrawalThreshold {
    pub fn from_defaults(spec: &ThresholdSpec) -> Self {
        Self {
            threshold_id: None,
            large_withdrawal_amount: spec.large_withdrawal_amount,
            daily_withdrawal_limit: spec.daily_withdrawal_limit,
            max_withdrawals_per_day: spec.max_withdrawals_per_day,
            require_approval_above: spec.require_approval_above,
            updated_by: None,
            updated_at: None,
        }
    }
}

/// Input for `set_thresholds`, and the shape of the configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub large_withdrawal_amount: f64,
    pub daily_withdrawal_limit: f64,
    pub max_withdrawals_per_day: u32,
    pub require_approval_above: f64,
}

impl Default for ThresholdSpec {
    fn default() -> Self {
        Self {
            large_withdrawal_amount: DEFAULT_LARGE_WITHDRAWAL_AMOUNT,
            daily_withdrawal_limit: DEFAULT_DAILY_WITHDRAWAL_LIMIT,
            max_withdrawals_per_day: DEFAULT_MAX_WITHDRAWALS_PER_DAY,
            require_approval_above: DEFAULT_REQUIRE_APPROVAL_ABOVE,
        }
    }
}

impl ThresholdSpec {
    pub fn validate(&self) -> FraudResult<()> {
        let amounts = [
            ("large_withdrawal_amount", self.large_withdrawal_amount),
            ("daily_withdrawal_limit", self.daily_withdrawal_limit),
            ("require_approval_above", self.require_approval_above),
        ];
        for (field, value) in amounts {
            if !value.is_finite() || value <= 0.0 {
                return Err(FraudError::validation(format!(
                    "{field} must be a positive amount, got {value}"
                )));
            }
        }
        if self.max_withdrawals_per_day == 0 {
            return Err(FraudError::validation("max_withdrawals_per_day must be at least 1"));
        }
        Ok(())
    }
}

impl FraudEngine {
    /// The authoritative thresholds: the latest saved row, or the defaults.
    pub fn get_thresholds(&self) -> FraudResult<WithdrawalThreshold> {
        Ok(self
            .store
            .latest_threshold()?
            .unwrap_or_else(|| WithdrawalThreshold::from_defaults(&self.config().default_thresholds)))
    }

    pub fn set_thresholds(&self, spec: ThresholdSpec, actor: &str) -> FraudResult<WithdrawalThreshold> {
        spec.validate()?;
        let previous = self.get_thresholds()?;
        let now = self.now();
        let threshold_id = self.store.insert_threshold(&spec, actor, now)?;
        let saved = WithdrawalThreshold {
            threshold_id: Some(threshold_id),
            large_withdrawal_amount: spec.large_withdrawal_amount,
            daily_withdrawal_limit: spec.daily_withdrawal_limit,
            max_withdrawals_per_day: spec.max_withdrawals_per_day,
            require_approval_above: spec.require_approval_above,
            updated_by: Some(actor.to_string()),
            updated_at: Some(now),
        };
        log::info!(
            "Withdrawal thresholds updated by {actor}: large {:.2} -> {:.2}",
            previous.large_withdrawal_amount,
            saved.large_withdrawal_amount
        );
        self.audit(
            actor,
            AuditAction::ThresholdsUpdated,
            "withdrawal_threshold",
            Some(&threshold_id.to_string()),
            serde_json::json!({ "previous": previous, "current": saved }),
        );
        Ok(saved)
    }
}
