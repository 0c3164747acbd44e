//! Audit trail of API access

use rusqlite::params_from_iter;
use serde::Serialize;

use super::Database;
use crate::error::Result;

/// One recorded access to the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    /// Client address, or "local"
    pub actor: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}

/// Narrows an audit listing; `None` fields match everything
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub limit: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            action: None,
            entity_type: None,
            entity_id: None,
            limit: 100,
        }
    }
}

impl Database {
    /// Record an access, returning the entry id
    pub fn log_audit(
        &self,
        actor: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_log (timestamp, actor, action, entity_type, entity_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                super::now_timestamp(),
                actor,
                action,
                entity_type,
                entity_id,
                details
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent entries first
    pub fn list_audit_log(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(action) = &filter.action {
            conditions.push("action = ?");
            values.push(action.clone().into());
        }
        if let Some(entity_type) = &filter.entity_type {
            conditions.push("entity_type = ?");
            values.push(entity_type.clone().into());
        }
        if let Some(entity_id) = filter.entity_id {
            conditions.push("entity_id = ?");
            values.push(entity_id.into());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        values.push(filter.limit.into());

        let sql = format!(
            "SELECT id, timestamp, actor, action, entity_type, entity_id, details
             FROM audit_log {} ORDER BY id DESC LIMIT ?",
            where_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    actor: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
