//! Withdrawal request queries.

use super::{opt_ts_column, text_enum, to_ts, ts_column, FraudStore};
use crate::{
    error::FraudResult,
    types::PageRequest,
    withdrawal_request::{WithdrawalRequest, WithdrawalRequestFilter, WithdrawalStatus},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const REQUEST_COLUMNS: &str = "request_id, reference, member_id, amount, reason, document_url,
    status, requested_by, reviewed_by, review_notes, reviewed_at, created_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<WithdrawalRequest> {
    Ok(WithdrawalRequest {
        request_id: row.get(0)?,
        reference: row.get(1)?,
        member_id: row.get(2)?,
        amount: row.get(3)?,
        reason: row.get(4)?,
        document_url: row.get(5)?,
        status: text_enum(row, 6, WithdrawalStatus::parse)?,
        requested_by: row.get(7)?,
        reviewed_by: row.get(8)?,
        review_notes: row.get(9)?,
        reviewed_at: opt_ts_column(row, 10)?,
        created_at: ts_column(row, 11)?,
    })
}

impl FraudStore {
    pub fn insert_withdrawal_request(&self, request: &WithdrawalRequest) -> FraudResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO withdrawal_request ({REQUEST_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                request.request_id,
                request.reference,
                request.member_id,
                request.amount,
                request.reason,
                request.document_url,
                request.status.as_str(),
                request.requested_by,
                request.reviewed_by,
                request.review_notes,
                request.reviewed_at.map(to_ts),
                to_ts(request.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_withdrawal_request(&self, request_id: &str) -> FraudResult<Option<WithdrawalRequest>> {
        self.conn
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM withdrawal_request WHERE request_id = ?1"),
                params![request_id],
                request_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Newest first.
    pub fn list_withdrawal_requests(
        &self,
        filter: &WithdrawalRequestFilter,
        page: PageRequest,
    ) -> FraudResult<(Vec<WithdrawalRequest>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM withdrawal_request
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR member_id = ?2)
             ORDER BY created_at DESC, request_id ASC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let items: Vec<WithdrawalRequest> = stmt
            .query_map(
                params![status, filter.member_id, page.limit(), page.offset()],
                request_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM withdrawal_request
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR member_id = ?2)",
            params![status, filter.member_id],
            |row| row.get(0),
        )?;
        Ok((items, total))
    }

    /// Move a PENDING request to its outcome. Returns rows changed: 0 means
    /// the request is unknown or was already decided.
    pub fn resolve_withdrawal_request(
        &self,
        request_id: &str,
        status: WithdrawalStatus,
        notes: Option<&str>,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> FraudResult<usize> {
        let changed = self.conn.execute(
            "UPDATE withdrawal_request
             SET status = ?2, reviewed_by = ?3, review_notes = ?4, reviewed_at = ?5
             WHERE request_id = ?1 AND status = 'PENDING'",
            params![request_id, status.as_str(), reviewer, notes, to_ts(at)],
        )?;
        Ok(changed)
    }

    pub fn withdrawal_request_count_with_status(&self, status: WithdrawalStatus) -> FraudResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM withdrawal_request WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
