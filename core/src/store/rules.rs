//! Rule catalog and withdrawal threshold queries.

use super::{text_enum, to_ts, ts_column, opt_ts_column, FraudStore};
use crate::{
    error::FraudResult,
    rule_catalog::{FraudRule, RuleKind, RuleType, Severity},
    threshold::{ThresholdSpec, WithdrawalThreshold},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};

const RULE_COLUMNS: &str = "rule_id, name, description, rule_type, max_count, window_hours,
    min_amount, max_amount, evaluator, custom_params, enabled, severity, risk_points,
    created_by, created_at, updated_at";

/// The type-specific parameter columns of a rule row.
#[derive(Default)]
struct KindColumns {
    max_count: Option<u32>,
    window_hours: Option<u32>,
    min_amount: Option<f64>,
    max_amount: Option<f64>,
    evaluator: Option<String>,
    custom_params: Option<String>,
}

fn kind_columns(kind: &RuleKind) -> FraudResult<KindColumns> {
    Ok(match kind {
        RuleKind::Frequency { max_count, window_hours } => KindColumns {
            max_count: Some(*max_count),
            window_hours: Some(*window_hours),
            ..KindColumns::default()
        },
        RuleKind::Amount { min_amount, max_amount } => KindColumns {
            min_amount: *min_amount,
            max_amount: *max_amount,
            ..KindColumns::default()
        },
        RuleKind::NoDeposit => KindColumns::default(),
        RuleKind::Custom { evaluator, params } => KindColumns {
            evaluator: Some(evaluator.clone()),
            custom_params: Some(serde_json::to_string(params)?),
            ..KindColumns::default()
        },
    })
}

fn kind_from_row(row: &Row<'_>) -> rusqlite::Result<RuleKind> {
    Ok(match text_enum(row, 3, RuleType::parse)? {
        RuleType::Frequency => RuleKind::Frequency {
            max_count: row.get(4)?,
            window_hours: row.get(5)?,
        },
        RuleType::Amount => RuleKind::Amount {
            min_amount: row.get(6)?,
            max_amount: row.get(7)?,
        },
        RuleType::NoDeposit => RuleKind::NoDeposit,
        RuleType::Custom => {
            let raw: Option<String> = row.get(9)?;
            let params = match raw {
                Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
                })?,
                None => serde_json::Value::Null,
            };
            RuleKind::Custom {
                evaluator: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                params,
            }
        }
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<FraudRule> {
    Ok(FraudRule {
        rule_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        kind: kind_from_row(row)?,
        enabled: row.get(10)?,
        severity: text_enum(row, 11, Severity::parse)?,
        risk_points: row.get(12)?,
        created_by: row.get(13)?,
        created_at: ts_column(row, 14)?,
        updated_at: ts_column(row, 15)?,
    })
}

impl FraudStore {
    // ── Rules ──────────────────────────────────────────────────

    pub fn insert_rule(&self, rule: &FraudRule) -> FraudResult<()> {
        let cols = kind_columns(&rule.kind)?;
        self.conn.execute(
            &format!(
                "INSERT INTO fraud_rule ({RULE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                rule.rule_id,
                rule.name,
                rule.description,
                rule.kind.rule_type().as_str(),
                cols.max_count,
                cols.window_hours,
                cols.min_amount,
                cols.max_amount,
                cols.evaluator,
                cols.custom_params,
                rule.enabled,
                rule.severity.as_str(),
                rule.risk_points,
                rule.created_by,
                to_ts(rule.created_at),
                to_ts(rule.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Replace every mutable column. The rule type may change, so stale
    /// parameter columns of the old type are cleared.
    pub fn update_rule(&self, rule: &FraudRule) -> FraudResult<()> {
        let cols = kind_columns(&rule.kind)?;
        self.conn.execute(
            "UPDATE fraud_rule SET
                name = ?2, description = ?3, rule_type = ?4, max_count = ?5,
                window_hours = ?6, min_amount = ?7, max_amount = ?8, evaluator = ?9,
                custom_params = ?10, enabled = ?11, severity = ?12, risk_points = ?13,
                updated_at = ?14
             WHERE rule_id = ?1",
            params![
                rule.rule_id,
                rule.name,
                rule.description,
                rule.kind.rule_type().as_str(),
                cols.max_count,
                cols.window_hours,
                cols.min_amount,
                cols.max_amount,
                cols.evaluator,
                cols.custom_params,
                rule.enabled,
                rule.severity.as_str(),
                rule.risk_points,
                to_ts(rule.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Violations go with the rule (ON DELETE CASCADE).
    pub fn delete_rule(&self, rule_id: &str) -> FraudResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM fraud_rule WHERE rule_id = ?1", params![rule_id])?;
        Ok(deleted)
    }

    pub fn get_rule(&self, rule_id: &str) -> FraudResult<Option<FraudRule>> {
        self.conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM fraud_rule WHERE rule_id = ?1"),
                params![rule_id],
                rule_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_rules(&self) -> FraudResult<Vec<FraudRule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM fraud_rule ORDER BY created_at ASC, rule_id ASC"
        ))?;
        let rows = stmt.query_map([], rule_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn enabled_rules(&self) -> FraudResult<Vec<FraudRule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM fraud_rule WHERE enabled = 1
             ORDER BY created_at ASC, rule_id ASC"
        ))?;
        let rows = stmt.query_map([], rule_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// (total, enabled)
    pub fn rule_counts(&self) -> FraudResult<(i64, i64)> {
        let counts: (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(enabled), 0) FROM fraud_rule",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }

    // ── Withdrawal thresholds ──────────────────────────────────

    pub fn latest_threshold(&self) -> FraudResult<Option<WithdrawalThreshold>> {
        self.conn
            .query_row(
                "SELECT threshold_id, large_withdrawal_amount, daily_withdrawal_limit,
                        max_withdrawals_per_day, require_approval_above, updated_by, updated_at
                 FROM withdrawal_threshold
                 ORDER BY updated_at DESC, threshold_id DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(WithdrawalThreshold {
                        threshold_id: row.get(0)?,
                        large_withdrawal_amount: row.get(1)?,
                        daily_withdrawal_limit: row.get(2)?,
                        max_withdrawals_per_day: row.get(3)?,
                        require_approval_above: row.get(4)?,
                        updated_by: row.get(5)?,
                        updated_at: opt_ts_column(row, 6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Append a threshold snapshot; returns its id.
    pub fn insert_threshold(
        &self,
        spec: &ThresholdSpec,
        updated_by: &str,
        at: DateTime<Utc>,
    ) -> FraudResult<i64> {
        self.conn.execute(
            "INSERT INTO withdrawal_threshold
             (large_withdrawal_amount, daily_withdrawal_limit, max_withdrawals_per_day,
              require_approval_above, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                spec.large_withdrawal_amount,
                spec.daily_withdrawal_limit,
                spec.max_withdrawals_per_day,
                spec.require_approval_above,
                updated_by,
                to_ts(at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}
