//! Member risk score cache.

use super::{text_enum, to_ts, ts_column, FraudStore};
use crate::{
    error::FraudResult,
    risk_scoring::{MemberRiskScore, RiskLevel, RiskScoreFilter},
    types::PageRequest,
};
use rusqlite::{params, OptionalExtension, Row};

const SCORE_COLUMNS: &str = "member_id, total_points, risk_level, frequency_points,
    amount_points, behavior_points, no_deposit_points, avg_transaction_amount,
    transaction_frequency, last_calculated_at";

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRiskScore> {
    Ok(MemberRiskScore {
        member_id: row.get(0)?,
        total_points: row.get(1)?,
        risk_level: text_enum(row, 2, RiskLevel::parse)?,
        frequency_points: row.get(3)?,
        amount_points: row.get(4)?,
        behavior_points: row.get(5)?,
        no_deposit_points: row.get(6)?,
        avg_transaction_amount: row.get(7)?,
        transaction_frequency: row.get(8)?,
        last_calculated_at: ts_column(row, 9)?,
    })
}

impl FraudStore {
    /// Replace the member's score row in one statement; every component
    /// column is overwritten.
    pub fn upsert_risk_score(&self, score: &MemberRiskScore) -> FraudResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO member_risk_score ({SCORE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(member_id) DO UPDATE SET
                    total_points = excluded.total_points,
                    risk_level = excluded.risk_level,
                    frequency_points = excluded.frequency_points,
                    amount_points = excluded.amount_points,
                    behavior_points = excluded.behavior_points,
                    no_deposit_points = excluded.no_deposit_points,
                    avg_transaction_amount = excluded.avg_transaction_amount,
                    transaction_frequency = excluded.transaction_frequency,
                    last_calculated_at = excluded.last_calculated_at"
            ),
            params![
                score.member_id,
                score.total_points,
                score.risk_level.as_str(),
                score.frequency_points,
                score.amount_points,
                score.behavior_points,
                score.no_deposit_points,
                score.avg_transaction_amount,
                score.transaction_frequency,
                to_ts(score.last_calculated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_risk_score(&self, member_id: &str) -> FraudResult<Option<MemberRiskScore>> {
        self.conn
            .query_row(
                &format!("SELECT {SCORE_COLUMNS} FROM member_risk_score WHERE member_id = ?1"),
                params![member_id],
                score_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Highest scores first.
    pub fn list_risk_scores(
        &self,
        filter: &RiskScoreFilter,
        page: PageRequest,
    ) -> FraudResult<(Vec<MemberRiskScore>, i64)> {
        let level = filter.risk_level.map(|l| l.as_str());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCORE_COLUMNS} FROM member_risk_score
             WHERE (?1 IS NULL OR risk_level = ?1) AND (?2 IS NULL OR total_points >= ?2)
             ORDER BY total_points DESC, member_id ASC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let items: Vec<MemberRiskScore> = stmt
            .query_map(
                params![level, filter.min_points, page.limit(), page.offset()],
                score_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM member_risk_score
             WHERE (?1 IS NULL OR risk_level = ?1) AND (?2 IS NULL OR total_points >= ?2)",
            params![level, filter.min_points],
            |row| row.get(0),
        )?;
        Ok((items, total))
    }

    pub fn count_risk_scores_at_level(&self, level: RiskLevel) -> FraudResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM member_risk_score WHERE risk_level = ?1",
            params![level.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
