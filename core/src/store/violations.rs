//! Rule violation queries, including the scans the rule engine runs.
//!
//! Dedup is enforced here, not by callers: `insert_violation` is a single
//! conditional INSERT backed by UNIQUE(rule_id, member_id, dedup_key).

use super::{
    members::transaction_from_row, opt_ts_column, to_ts, ts_column, FraudStore,
    NoDepositMemberRow, WithdrawalBurstRow,
};
use crate::{
    error::FraudResult,
    member::TransactionRecord,
    types::PageRequest,
    violation::{NewViolation, RuleViolation, ViolationFilter},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const VIOLATION_SELECT: &str = "SELECT v.violation_id, v.rule_id, r.name, v.member_id,
        v.transaction_id, v.details, v.risk_points, v.reviewed, v.reviewed_by,
        v.review_notes, v.reviewed_at, v.created_at
    FROM rule_violation v
    JOIN fraud_rule r ON r.rule_id = v.rule_id";

const VIOLATION_FILTER: &str = "(?1 IS NULL OR v.rule_id = ?1)
    AND (?2 IS NULL OR v.member_id = ?2)
    AND (?3 IS NULL OR v.reviewed = ?3)";

fn violation_from_row(row: &Row<'_>) -> rusqlite::Result<RuleViolation> {
    Ok(RuleViolation {
        violation_id: row.get(0)?,
        rule_id: row.get(1)?,
        rule_name: row.get(2)?,
        member_id: row.get(3)?,
        transaction_id: row.get(4)?,
        details: row.get(5)?,
        risk_points: row.get(6)?,
        reviewed: row.get(7)?,
        reviewed_by: row.get(8)?,
        review_notes: row.get(9)?,
        reviewed_at: opt_ts_column(row, 10)?,
        created_at: ts_column(row, 11)?,
    })
}

impl FraudStore {
    /// Insert unless an equivalent violation exists. Returns `true` when a
    /// row was written.
    ///
    /// Skipped when the (rule, member, dedup_key) triple is taken, or when
    /// `not_since` is set and the (rule, member) pair already has a
    /// violation created at or after it.
    pub fn insert_violation(&self, draft: &NewViolation) -> FraudResult<bool> {
        let v = &draft.violation;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO rule_violation
             (violation_id, rule_id, member_id, transaction_id, details, risk_points,
              dedup_key, reviewed, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8
             WHERE NOT EXISTS (
                 SELECT 1 FROM rule_violation
                 WHERE rule_id = ?2 AND member_id = ?3
                   AND ?9 IS NOT NULL AND created_at >= ?9
             )",
            params![
                v.violation_id,
                v.rule_id,
                v.member_id,
                v.transaction_id,
                v.details,
                v.risk_points,
                draft.dedup_key,
                to_ts(v.created_at),
                draft.not_since.map(to_ts),
            ],
        )?;
        Ok(inserted == 1)
    }

    // ── Rule engine scans ──────────────────────────────────────

    /// Members with more than `max_count` non-failed withdrawals in
    /// [since, until], with their most recent such withdrawal.
    pub fn withdrawal_bursts(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        max_count: u32,
    ) -> FraudResult<Vec<WithdrawalBurstRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.member_id, COUNT(*),
                    (SELECT l.transaction_id FROM member_transaction l
                     WHERE l.member_id = t.member_id
                       AND l.txn_type = 'WITHDRAWAL' AND l.status != 'FAILED'
                       AND l.created_at >= ?1 AND l.created_at <= ?2
                     ORDER BY l.created_at DESC, l.transaction_id DESC
                     LIMIT 1)
             FROM member_transaction t
             WHERE t.txn_type = 'WITHDRAWAL' AND t.status != 'FAILED'
               AND t.created_at >= ?1 AND t.created_at <= ?2
             GROUP BY t.member_id
             HAVING COUNT(*) > ?3
             ORDER BY t.member_id ASC",
        )?;
        let rows = stmt.query_map(params![to_ts(since), to_ts(until), max_count], |row| {
            Ok(WithdrawalBurstRow {
                member_id: row.get(0)?,
                withdrawal_count: row.get(1)?,
                latest_transaction_id: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Non-failed withdrawals of at least `floor` that this rule has not
    /// flagged yet, oldest first.
    pub fn large_withdrawals_without_violation(
        &self,
        rule_id: &str,
        floor: f64,
    ) -> FraudResult<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.transaction_id, t.member_id, t.txn_type, t.amount, t.status,
                    t.reference, t.created_at
             FROM member_transaction t
             WHERE t.txn_type = 'WITHDRAWAL' AND t.status != 'FAILED' AND t.amount >= ?2
               AND NOT EXISTS (
                   SELECT 1 FROM rule_violation v
                   WHERE v.rule_id = ?1 AND v.transaction_id = t.transaction_id
               )
             ORDER BY t.created_at ASC, t.transaction_id ASC",
        )?;
        let rows = stmt.query_map(params![rule_id, floor], transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Members with at least one withdrawal and no completed deposit ever,
    /// not yet flagged by this rule.
    pub fn members_without_deposits(&self, rule_id: &str) -> FraudResult<Vec<NoDepositMemberRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.member_id, COUNT(*),
                    (SELECT l.transaction_id FROM member_transaction l
                     WHERE l.member_id = t.member_id AND l.txn_type = 'WITHDRAWAL'
                     ORDER BY l.created_at DESC, l.transaction_id DESC
                     LIMIT 1)
             FROM member_transaction t
             WHERE t.txn_type = 'WITHDRAWAL'
               AND NOT EXISTS (
                   SELECT 1 FROM member_transaction d
                   WHERE d.member_id = t.member_id
                     AND d.txn_type = 'DEPOSIT' AND d.status = 'COMPLETED'
               )
               AND NOT EXISTS (
                   SELECT 1 FROM rule_violation v
                   WHERE v.rule_id = ?1 AND v.member_id = t.member_id
               )
             GROUP BY t.member_id
             ORDER BY t.member_id ASC",
        )?;
        let rows = stmt.query_map(params![rule_id], |row| {
            Ok(NoDepositMemberRow {
                member_id: row.get(0)?,
                withdrawal_count: row.get(1)?,
                latest_transaction_id: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Reads & review ─────────────────────────────────────────

    pub fn get_violation(&self, violation_id: &str) -> FraudResult<Option<RuleViolation>> {
        self.conn
            .query_row(
                &format!("{VIOLATION_SELECT} WHERE v.violation_id = ?1"),
                params![violation_id],
                violation_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Newest first.
    pub fn list_violations(
        &self,
        filter: &ViolationFilter,
        page: PageRequest,
    ) -> FraudResult<(Vec<RuleViolation>, i64)> {
        let mut stmt = self.conn.prepare(&format!(
            "{VIOLATION_SELECT} WHERE {VIOLATION_FILTER}
             ORDER BY v.created_at DESC, v.violation_id ASC
             LIMIT ?4 OFFSET ?5"
        ))?;
        let items: Vec<RuleViolation> = stmt
            .query_map(
                params![
                    filter.rule_id,
                    filter.member_id,
                    filter.reviewed,
                    page.limit(),
                    page.offset()
                ],
                violation_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM rule_violation v WHERE {VIOLATION_FILTER}"),
            params![filter.rule_id, filter.member_id, filter.reviewed],
            |row| row.get(0),
        )?;
        Ok((items, total))
    }

    /// Every matching violation, oldest first.
    pub fn all_violations(&self, filter: &ViolationFilter) -> FraudResult<Vec<RuleViolation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VIOLATION_SELECT} WHERE {VIOLATION_FILTER}
             ORDER BY v.created_at ASC, v.violation_id ASC"
        ))?;
        let rows = stmt.query_map(
            params![filter.rule_id, filter.member_id, filter.reviewed],
            violation_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Returns the number of rows changed (0 when the id is unknown).
    pub fn review_violation(
        &self,
        violation_id: &str,
        reviewed: bool,
        notes: Option<&str>,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> FraudResult<usize> {
        let changed = self.conn.execute(
            "UPDATE rule_violation
             SET reviewed = ?2, reviewed_by = ?3, review_notes = ?4, reviewed_at = ?5
             WHERE violation_id = ?1",
            params![violation_id, reviewed, reviewer, notes, to_ts(at)],
        )?;
        Ok(changed)
    }

    pub fn count_violations_for_rule(&self, rule_id: &str) -> FraudResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rule_violation WHERE rule_id = ?1",
            params![rule_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// (total, unreviewed)
    pub fn violation_counts(&self) -> FraudResult<(i64, i64)> {
        let counts: (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN reviewed = 0 THEN 1 ELSE 0 END), 0)
             FROM rule_violation",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }
}
