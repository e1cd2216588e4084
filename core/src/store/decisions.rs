//! Fraud decision log.
//!
//! Decisions are insert-only apart from the approval columns, which move
//! through conditional UPDATEs so a decided approval cannot be overwritten.

use super::{opt_ts_column, text_enum, to_ts, ts_column, FraudStore};
use crate::{
    decision_logic::{DecisionAction, DecisionFilter, FraudDecision},
    error::FraudResult,
    risk_scoring::RiskLevel,
    types::PageRequest,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const DECISION_COLUMNS: &str = "decision_id, member_id, transaction_id, risk_score, risk_level,
    action, reason, requires_approval, approved, approved_by, approved_at, created_at";

const DECISION_FILTER: &str = "(?1 IS NULL OR member_id = ?1)
    AND (?2 IS NULL OR action = ?2)
    AND (?3 IS NULL
         OR (?3 = 1 AND requires_approval = 1 AND approved IS NULL)
         OR (?3 = 0 AND NOT (requires_approval = 1 AND approved IS NULL)))";

fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<FraudDecision> {
    Ok(FraudDecision {
        decision_id: row.get(0)?,
        member_id: row.get(1)?,
        transaction_id: row.get(2)?,
        risk_score: row.get(3)?,
        risk_level: text_enum(row, 4, RiskLevel::parse)?,
        action: text_enum(row, 5, DecisionAction::parse)?,
        reason: row.get(6)?,
        requires_approval: row.get(7)?,
        approved: row.get(8)?,
        approved_by: row.get(9)?,
        approved_at: opt_ts_column(row, 10)?,
        created_at: ts_column(row, 11)?,
    })
}

impl FraudStore {
    pub fn insert_decision(&self, decision: &FraudDecision) -> FraudResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO fraud_decision ({DECISION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                decision.decision_id,
                decision.member_id,
                decision.transaction_id,
                decision.risk_score,
                decision.risk_level.as_str(),
                decision.action.as_str(),
                decision.reason,
                decision.requires_approval,
                decision.approved,
                decision.approved_by,
                decision.approved_at.map(to_ts),
                to_ts(decision.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_decision(&self, decision_id: &str) -> FraudResult<Option<FraudDecision>> {
        self.conn
            .query_row(
                &format!("SELECT {DECISION_COLUMNS} FROM fraud_decision WHERE decision_id = ?1"),
                params![decision_id],
                decision_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Newest first.
    pub fn list_decisions(
        &self,
        filter: &DecisionFilter,
        page: PageRequest,
    ) -> FraudResult<(Vec<FraudDecision>, i64)> {
        let action = filter.action.map(|a| a.as_str());
        // One evaluation stamps all its decisions alike; rowid keeps insert order.
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DECISION_COLUMNS} FROM fraud_decision
             WHERE {DECISION_FILTER}
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4 OFFSET ?5"
        ))?;
        let items: Vec<FraudDecision> = stmt
            .query_map(
                params![
                    filter.member_id,
                    action,
                    filter.pending_approval,
                    page.limit(),
                    page.offset()
                ],
                decision_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM fraud_decision WHERE {DECISION_FILTER}"),
            params![filter.member_id, action, filter.pending_approval],
            |row| row.get(0),
        )?;
        Ok((items, total))
    }

    /// A member's decisions in the order they were recorded.
    pub fn decisions_for_member(&self, member_id: &str) -> FraudResult<Vec<FraudDecision>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DECISION_COLUMNS} FROM fraud_decision
             WHERE member_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![member_id], decision_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Record the first approval outcome. Returns rows changed: 0 when the
    /// decision is unknown, needs no approval, or is already decided.
    pub fn set_decision_approval(
        &self,
        decision_id: &str,
        approved: bool,
        approver: &str,
        at: DateTime<Utc>,
    ) -> FraudResult<usize> {
        let changed = self.conn.execute(
            "UPDATE fraud_decision
             SET approved = ?2, approved_by = ?3, approved_at = ?4
             WHERE decision_id = ?1 AND requires_approval = 1 AND approved IS NULL",
            params![decision_id, approved, approver, to_ts(at)],
        )?;
        Ok(changed)
    }

    /// Return a decided approval to pending.
    pub fn clear_decision_approval(&self, decision_id: &str) -> FraudResult<usize> {
        let changed = self.conn.execute(
            "UPDATE fraud_decision
             SET approved = NULL, approved_by = NULL, approved_at = NULL
             WHERE decision_id = ?1 AND requires_approval = 1 AND approved IS NOT NULL",
            params![decision_id],
        )?;
        Ok(changed)
    }

    /// (total, pending approval)
    pub fn decision_counts(&self) -> FraudResult<(i64, i64)> {
        let counts: (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN requires_approval = 1 AND approved IS NULL
                                      THEN 1 ELSE 0 END), 0)
             FROM fraud_decision",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }
}
