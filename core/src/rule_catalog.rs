//! Rule catalog — the configurable set of fraud rules.
//!
//! Rules are created and edited by operators; the rule engine only reads
//! the enabled ones. Each rule type carries exactly the parameters its
//! evaluation strategy needs, so an invalid combination cannot be stored.

use crate::{
    audit::AuditAction,
    engine::FraudEngine,
    error::{FraudError, FraudResult},
    types::EntityId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// The stored `rule_type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    Frequency,
    Amount,
    NoDeposit,
    Custom,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frequency => "FREQUENCY",
            Self::Amount => "AMOUNT",
            Self::NoDeposit => "NO_DEPOSIT",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "FREQUENCY" => Some(Self::Frequency),
            "AMOUNT" => Some(Self::Amount),
            "NO_DEPOSIT" => Some(Self::NoDeposit),
            "CUSTOM" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Rule type together with its type-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    /// More than `max_count` withdrawals inside the trailing `window_hours`.
    Frequency { max_count: u32, window_hours: u32 },
    /// A single withdrawal at or above the ceiling. Without `max_amount` the
    /// ceiling is the configured large-withdrawal threshold. `min_amount` is
    /// stored with the rule but does not affect which withdrawals match.
    Amount {
        #[serde(default)]
        min_amount: Option<f64>,
        #[serde(default)]
        max_amount: Option<f64>,
    },
    /// Withdrawals on record but no completed deposit, ever.
    NoDeposit,
    /// Delegated to a `CustomRuleEvaluator` registered under `evaluator`.
    Custom {
        evaluator: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl RuleKind {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Frequency { .. } => RuleType::Frequency,
            Self::Amount { .. } => RuleType::Amount,
            Self::NoDeposit => RuleType::NoDeposit,
            Self::Custom { .. } => RuleType::Custom,
        }
    }

    pub fn validate(&self) -> FraudResult<()> {
        match self {
            Self::Frequency { max_count, window_hours } => {
                if *max_count == 0 {
                    return Err(FraudError::validation("FREQUENCY rule needs max_count >= 1"));
                }
                if *window_hours == 0 {
                    return Err(FraudError::validation("FREQUENCY rule needs window_hours >= 1"));
                }
            }
            Self::Amount { min_amount, max_amount } => {
                if min_amount.is_none() && max_amount.is_none() {
                    return Err(FraudError::validation(
                        "AMOUNT rule needs at least one of min_amount or max_amount",
                    ));
                }
                for value in [min_amount, max_amount].into_iter().flatten() {
                    if !value.is_finite() || *value < 0.0 {
                        return Err(FraudError::validation(format!(
                            "AMOUNT rule bound {value} must be a non-negative amount"
                        )));
                    }
                }
                if let (Some(min), Some(max)) = (min_amount, max_amount) {
                    if min > max {
                        return Err(FraudError::validation(format!(
                            "AMOUNT rule min_amount {min} exceeds max_amount {max}"
                        )));
                    }
                }
            }
            Self::NoDeposit => {}
            Self::Custom { evaluator, .. } => {
                if evaluator.trim().is_empty() {
                    return Err(FraudError::validation("CUSTOM rule needs an evaluator name"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRule {
    pub rule_id: EntityId,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub enabled: bool,
    pub severity: Severity,
    pub risk_points: u32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `create_rule`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub severity: Severity,
    pub risk_points: u32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RuleSpec {
    pub fn validate(&self) -> FraudResult<()> {
        if self.name.trim().is_empty() {
            return Err(FraudError::validation("rule name must not be empty"));
        }
        validate_risk_points(self.risk_points)?;
        self.kind.validate()
    }
}

/// Partial update for `update_rule`. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<RuleKind>,
    pub severity: Option<Severity>,
    pub risk_points: Option<u32>,
    pub enabled: Option<bool>,
}

fn validate_risk_points(points: u32) -> FraudResult<()> {
    if points == 0 {
        return Err(FraudError::validation("risk_points must be a positive integer"));
    }
    Ok(())
}

impl FraudEngine {
    pub fn list_rules(&self) -> FraudResult<Vec<FraudRule>> {
        self.store.list_rules()
    }

    pub fn get_rule(&self, rule_id: &str) -> FraudResult<FraudRule> {
        self.store
            .get_rule(rule_id)?
            .ok_or_else(|| FraudError::not_found("Rule", rule_id))
    }

    pub fn create_rule(&self, spec: RuleSpec, actor: &str) -> FraudResult<FraudRule> {
        spec.validate()?;
        let now = self.now();
        let rule = FraudRule {
            rule_id: uuid::Uuid::new_v4().to_string(),
            name: spec.name.trim().to_string(),
            description: spec.description,
            kind: spec.kind,
            enabled: spec.enabled,
            severity: spec.severity,
            risk_points: spec.risk_points,
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_rule(&rule)?;
        log::info!("Rule '{}' ({}) created by {actor}", rule.name, rule.kind.rule_type().as_str());
        self.audit(
            actor,
            AuditAction::RuleCreated,
            "fraud_rule",
            Some(&rule.rule_id),
            serde_json::to_value(&rule)?,
        );
        Ok(rule)
    }

    pub fn update_rule(&self, rule_id: &str, patch: RulePatch, actor: &str) -> FraudResult<FraudRule> {
        let mut rule = self.get_rule(rule_id)?;

        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(FraudError::validation("rule name must not be empty"));
            }
            rule.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            rule.description = Some(description);
        }
        if let Some(kind) = patch.kind {
            kind.validate()?;
            rule.kind = kind;
        }
        if let Some(severity) = patch.severity {
            rule.severity = severity;
        }
        if let Some(points) = patch.risk_points {
            validate_risk_points(points)?;
            rule.risk_points = points;
        }
        if let Some(enabled) = patch.enabled {
            rule.enabled = enabled;
        }
        rule.updated_at = self.now();

        self.store.update_rule(&rule)?;
        self.audit(
            actor,
            AuditAction::RuleUpdated,
            "fraud_rule",
            Some(rule_id),
            serde_json::to_value(&rule)?,
        );
        Ok(rule)
    }

    /// Delete a rule and, through the cascade, all of its violations.
    /// Returns the number of violations removed with it.
    pub fn delete_rule(&self, rule_id: &str, actor: &str) -> FraudResult<i64> {
        let removed = self.store.atomically(|| {
            let rule = self.get_rule(rule_id)?;
            let violations = self.store.count_violations_for_rule(rule_id)?;
            self.store.delete_rule(rule_id)?;
            Ok((rule, violations))
        });
        let (rule, violations) = removed?;
        log::info!("Rule '{}' deleted by {actor} ({violations} violations removed)", rule.name);
        self.audit(
            actor,
            AuditAction::RuleDeleted,
            "fraud_rule",
            Some(rule_id),
            serde_json::json!({ "name": rule.name, "violations_removed": violations }),
        );
        Ok(violations)
    }
}
