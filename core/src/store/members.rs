//! Member, transaction and fraud-alert queries.

use super::{from_ts, text_enum, to_ts, ts_column, FraudStore};
use crate::{
    decision_logic::FraudAlert,
    error::FraudResult,
    member::{Member, MemberStatus, TransactionRecord, TransactionStatus, TransactionType},
    rule_catalog::Severity,
    types::PageRequest,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const TRANSACTION_COLUMNS: &str =
    "transaction_id, member_id, txn_type, amount, status, reference, created_at";

pub(crate) fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    Ok(TransactionRecord {
        transaction_id: row.get(0)?,
        member_id: row.get(1)?,
        txn_type: text_enum(row, 2, TransactionType::parse)?,
        amount: row.get(3)?,
        status: text_enum(row, 4, TransactionStatus::parse)?,
        reference: row.get(5)?,
        created_at: ts_column(row, 6)?,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        member_id: row.get(0)?,
        member_number: row.get(1)?,
        full_name: row.get(2)?,
        status: text_enum(row, 3, MemberStatus::parse)?,
        balance: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

impl FraudStore {
    // ── Members ────────────────────────────────────────────────

    pub fn insert_member(&self, member: &Member) -> FraudResult<()> {
        self.conn.execute(
            "INSERT INTO member (member_id, member_number, full_name, status, balance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                member.member_id,
                member.member_number,
                member.full_name,
                member.status.as_str(),
                member.balance,
                to_ts(member.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_member(&self, member_id: &str) -> FraudResult<Option<Member>> {
        self.conn
            .query_row(
                "SELECT member_id, member_number, full_name, status, balance, created_at
                 FROM member WHERE member_id = ?1",
                params![member_id],
                member_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn set_member_status(&self, member_id: &str, status: MemberStatus) -> FraudResult<()> {
        self.conn.execute(
            "UPDATE member SET status = ?1 WHERE member_id = ?2",
            params![status.as_str(), member_id],
        )?;
        Ok(())
    }

    pub fn all_member_ids(&self) -> FraudResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT member_id FROM member ORDER BY member_number ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn member_ids_page(&self, page: PageRequest) -> FraudResult<(Vec<String>, i64)> {
        let mut stmt = self.conn.prepare(
            "SELECT member_id FROM member ORDER BY member_number ASC LIMIT ?1 OFFSET ?2",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![page.limit(), page.offset()], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((ids, self.member_count()?))
    }

    pub fn member_count(&self) -> FraudResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM member", [], |row| row.get(0))?;
        Ok(count)
    }

    // ── Transactions ───────────────────────────────────────────

    pub fn insert_transaction(&self, txn: &TransactionRecord) -> FraudResult<()> {
        self.conn.execute(
            "INSERT INTO member_transaction
             (transaction_id, member_id, txn_type, amount, status, reference, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                txn.transaction_id,
                txn.member_id,
                txn.txn_type.as_str(),
                txn.amount,
                txn.status.as_str(),
                txn.reference,
                to_ts(txn.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_transaction(&self, transaction_id: &str) -> FraudResult<Option<TransactionRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM member_transaction WHERE transaction_id = ?1"),
                params![transaction_id],
                transaction_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// A member's full history, oldest first.
    pub fn transactions_for_member(&self, member_id: &str) -> FraudResult<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM member_transaction
             WHERE member_id = ?1
             ORDER BY created_at ASC, transaction_id ASC"
        ))?;
        let rows = stmt.query_map(params![member_id], transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_transaction_status(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
    ) -> FraudResult<()> {
        self.conn.execute(
            "UPDATE member_transaction SET status = ?1 WHERE transaction_id = ?2",
            params![status.as_str(), transaction_id],
        )?;
        Ok(())
    }

    pub fn transaction_count(&self) -> FraudResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM member_transaction", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn transaction_count_since(&self, since: DateTime<Utc>) -> FraudResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM member_transaction WHERE created_at >= ?1",
            params![to_ts(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn transaction_count_with_status(&self, status: TransactionStatus) -> FraudResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM member_transaction WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mean amount across every transaction; 0 when there are none.
    pub fn avg_transaction_amount(&self) -> FraudResult<f64> {
        let avg: Option<f64> = self.conn.query_row(
            "SELECT AVG(amount) FROM member_transaction",
            [],
            |row| row.get(0),
        )?;
        Ok(avg.unwrap_or(0.0))
    }

    // ── Fraud alerts ───────────────────────────────────────────

    pub fn insert_fraud_alert(&self, alert: &FraudAlert) -> FraudResult<()> {
        self.conn.execute(
            "INSERT INTO fraud_alert
             (alert_id, member_id, transaction_id, alert_type, severity, description,
              risk_score, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                alert.alert_id,
                alert.member_id,
                alert.transaction_id,
                alert.alert_type,
                alert.severity.as_str(),
                alert.description,
                alert.risk_score,
                alert.status,
                to_ts(alert.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn fraud_alerts_for_member(&self, member_id: &str) -> FraudResult<Vec<FraudAlert>> {
        let mut stmt = self.conn.prepare(
            "SELECT alert_id, member_id, transaction_id, alert_type, severity, description,
                    risk_score, status, created_at
             FROM fraud_alert WHERE member_id = ?1
             ORDER BY created_at ASC, alert_id ASC",
        )?;
        let rows = stmt.query_map(params![member_id], |row| {
            Ok(FraudAlert {
                alert_id: row.get(0)?,
                member_id: row.get(1)?,
                transaction_id: row.get(2)?,
                alert_type: row.get(3)?,
                severity: text_enum(row, 4, Severity::parse)?,
                description: row.get(5)?,
                risk_score: row.get(6)?,
                status: row.get(7)?,
                created_at: from_ts(row.get(8)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn open_fraud_alert_count(&self) -> FraudResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM fraud_alert WHERE status = 'OPEN'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
