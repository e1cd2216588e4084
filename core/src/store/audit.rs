//! Audit log.

use super::{to_ts, ts_column, FraudStore};
use crate::{audit::AuditEntry, error::FraudResult, types::PageRequest};
use rusqlite::{params, types::Type};

impl FraudStore {
    pub fn append_audit(&self, entry: &AuditEntry) -> FraudResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (actor, action, entity_type, entity_id, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.actor,
                entry.action,
                entry.entity_type,
                entry.entity_id,
                serde_json::to_string(&entry.details)?,
                to_ts(entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// Newest first, optionally narrowed to one entity type.
    pub fn list_audit(
        &self,
        entity_type: Option<&str>,
        page: PageRequest,
    ) -> FraudResult<(Vec<AuditEntry>, i64)> {
        let mut stmt = self.conn.prepare(
            "SELECT audit_id, actor, action, entity_type, entity_id, details, created_at
             FROM audit_log
             WHERE (?1 IS NULL OR entity_type = ?1)
             ORDER BY audit_id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let items: Vec<AuditEntry> = stmt
            .query_map(params![entity_type, page.limit(), page.offset()], |row| {
                let raw: String = row.get(5)?;
                let details = serde_json::from_str(&raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?;
                Ok(AuditEntry {
                    audit_id: row.get(0)?,
                    actor: row.get(1)?,
                    action: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    details,
                    created_at: ts_column(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE (?1 IS NULL OR entity_type = ?1)",
            params![entity_type],
            |row| row.get(0),
        )?;
        Ok((items, total))
    }
}
