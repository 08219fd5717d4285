// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation State Store (spec §4.C) — a durable key→record store used only
//! for crash recovery, never as a source of truth during a run.

use crate::db::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A durable record describing an operation that may have been interrupted
/// by a process restart.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OperationStateRecord {
    pub key: String,
    pub r#type: String,
    pub status: String,
    pub message: String,
    pub data_blob: Value,
    pub created_at: DateTime<Utc>,
}

/// Default cutoff: "running" records older than this are reinterpreted as
/// interrupted on startup (spec §4.C).
pub const DEFAULT_RUNNING_CUTOFF_SECS: i64 = 5 * 60;

pub struct OperationStateStore {
    db: Db,
}

impl OperationStateStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Key convention from spec §6: `<Type>_<OperationId>`.
    pub fn key_for(operation_type: &str, operation_id: &str) -> String {
        format!("{operation_type}_{operation_id}")
    }

    pub async fn save_state(&self, record: &OperationStateRecord) -> Result<()> {
        let data_blob = serde_json::to_string(&record.data_blob)?;
        sqlx::query(
            "INSERT INTO operation_state (key, type, status, message, data_blob, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
                type = excluded.type,
                status = excluded.status,
                message = excluded.message,
                data_blob = excluded.data_blob",
        )
        .bind(&record.key)
        .bind(&record.r#type)
        .bind(&record.status)
        .bind(&record.message)
        .bind(data_blob)
        .bind(record.created_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<OperationStateRecord>> {
        let row = sqlx::query_as::<_, RawRow>(
            "SELECT key, type, status, message, data_blob, created_at
             FROM operation_state WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(self.db.pool())
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_states_by_type(&self, r#type: &str) -> Result<Vec<OperationStateRecord>> {
        let rows = sqlx::query_as::<_, RawRow>(
            "SELECT key, type, status, message, data_blob, created_at
             FROM operation_state WHERE type = ?1",
        )
        .bind(r#type)
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_all_states(&self) -> Result<Vec<OperationStateRecord>> {
        let rows = sqlx::query_as::<_, RawRow>(
            "SELECT key, type, status, message, data_blob, created_at FROM operation_state",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn remove_state(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM operation_state WHERE key = ?1").bind(key).execute(self.db.pool()).await?;
        Ok(())
    }

    /// Records in `Running` whose `created_at` is older than `cutoff_secs`
    /// are crashed jobs: no process is alive to have updated them. The
    /// caller (engine startup) uses this to mark them `Failed` with
    /// "Operation interrupted by service restart".
    pub async fn find_stale_running(&self, cutoff_secs: i64) -> Result<Vec<OperationStateRecord>> {
        let all = self.get_all_states().await?;
        let cutoff = Utc::now() - chrono::Duration::seconds(cutoff_secs);
        Ok(all.into_iter().filter(|r| r.status == "running" && r.created_at < cutoff).collect())
    }
}

#[derive(sqlx::FromRow)]
struct RawRow {
    key: String,
    r#type: String,
    status: String,
    message: String,
    data_blob: String,
    created_at: String,
}

impl TryFrom<RawRow> for OperationStateRecord {
    type Error = crate::error::StorageError;

    fn try_from(row: RawRow) -> std::result::Result<Self, Self::Error> {
        let data_blob = serde_json::from_str(&row.data_blob)
            .map_err(|e| crate::error::StorageError::Malformed { key: row.key.clone(), source: e })?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Self { key: row.key, r#type: row.r#type, status: row.status, message: row.message, data_blob, created_at })
    }
}

#[cfg(test)]
#[path = "operation_state_tests.rs"]
mod tests;
