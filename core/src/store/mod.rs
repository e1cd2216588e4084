//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Pipeline components call store methods; they never execute SQL directly.
//!
//! Timestamps are stored as UTC unix seconds. Enums are stored as their
//! SCREAMING_SNAKE_CASE names.

use crate::error::FraudResult;
use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, Row};

mod audit;
mod decisions;
mod members;
mod rules;
mod scores;
mod violations;
mod withdrawals;

pub struct FraudStore {
    conn: Connection,
}

// ── Row types for aggregate queries ────────────────────────────────────────

/// A member whose withdrawal count inside a window exceeded a limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalBurstRow {
    pub member_id: String,
    pub withdrawal_count: i64,
    pub latest_transaction_id: String,
}

/// A member who withdraws but has never completed a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoDepositMemberRow {
    pub member_id: String,
    pub withdrawal_count: i64,
    pub latest_transaction_id: String,
}

impl FraudStore {
    pub fn open(path: &str) -> FraudResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> FraudResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> FraudResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_members.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_fraud_rules.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_risk_decisions.sql"))?;
        Ok(())
    }

    /// Run `f` inside one SQLite transaction: committed when `f` returns
    /// `Ok`, rolled back otherwise. Must not be nested.
    pub fn atomically<T>(&self, f: impl FnOnce() -> FraudResult<T>) -> FraudResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }
}

// ── Column helpers ─────────────────────────────────────────────────────────

pub(crate) fn to_ts(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

pub(crate) fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default()
}

pub(crate) fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(from_ts(row.get(idx)?))
}

pub(crate) fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(from_ts))
}

/// Read a stored enum name, failing the row on an unknown value.
pub(crate) fn text_enum<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognised value '{raw}'").into(),
        )
    })
}
