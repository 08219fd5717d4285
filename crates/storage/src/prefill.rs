// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefill persistence (spec §3, §4.M): the `PrefillSession` row mirroring
//! in-memory session state, `PrefillHistoryEntry` accounting, and the
//! `PrefillCachedDepot` table used to skip up-to-date apps on a future run.

use crate::db::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefillSessionStatus {
    Active,
    Terminated,
    Orphaned,
    Cleaned,
}

impl PrefillSessionStatus {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Terminated => "terminated",
            Self::Orphaned => "orphaned",
            Self::Cleaned => "cleaned",
        }
    }

    pub fn from_sql(s: &str) -> Self {
        match s {
            "terminated" => Self::Terminated,
            "orphaned" => Self::Orphaned,
            "cleaned" => Self::Cleaned,
            _ => Self::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefillHistoryStatus {
    InProgress,
    Completed,
    Cached,
    Skipped,
    Failed,
    Cancelled,
}

impl PrefillHistoryStatus {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cached => "cached",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_sql(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "cached" => Self::Cached,
            "skipped" => Self::Skipped,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefillSession {
    pub session_id: String,
    pub created_by_session_id: Option<String>,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub status: PrefillSessionStatus,
    pub steam_username: Option<String>,
    pub is_authenticated: bool,
    pub is_prefilling: bool,
    pub created_at_utc: DateTime<Utc>,
    pub expires_at_utc: DateTime<Utc>,
    pub ended_at_utc: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
    pub terminated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefillHistoryEntry {
    pub id: i64,
    pub session_id: String,
    pub app_id: i64,
    pub app_name: Option<String>,
    pub started_at_utc: DateTime<Utc>,
    pub completed_at_utc: Option<DateTime<Utc>>,
    pub status: PrefillHistoryStatus,
    pub bytes_downloaded: i64,
    pub total_bytes: i64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefillCachedDepot {
    pub session_id: String,
    pub depot_id: i64,
    pub manifest_id: String,
    pub total_bytes: i64,
    pub recorded_at_utc: DateTime<Utc>,
}

pub struct PrefillStore {
    db: Db,
}

impl PrefillStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // ---- PrefillSession ----

    pub async fn upsert_session(&self, s: &PrefillSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO prefill_session
             (session_id, created_by_session_id, container_id, container_name, status,
              steam_username, is_authenticated, is_prefilling, created_at_utc, expires_at_utc,
              ended_at_utc, termination_reason, terminated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(session_id) DO UPDATE SET
                container_id = excluded.container_id,
                container_name = excluded.container_name,
                status = excluded.status,
                steam_username = excluded.steam_username,
                is_authenticated = excluded.is_authenticated,
                is_prefilling = excluded.is_prefilling,
                expires_at_utc = excluded.expires_at_utc,
                ended_at_utc = excluded.ended_at_utc,
                termination_reason = excluded.termination_reason,
                terminated_by = excluded.terminated_by",
        )
        .bind(&s.session_id)
        .bind(&s.created_by_session_id)
        .bind(&s.container_id)
        .bind(&s.container_name)
        .bind(s.status.as_sql())
        .bind(&s.steam_username)
        .bind(s.is_authenticated)
        .bind(s.is_prefilling)
        .bind(s.created_at_utc.to_rfc3339())
        .bind(s.expires_at_utc.to_rfc3339())
        .bind(s.ended_at_utc.map(|d| d.to_rfc3339()))
        .bind(&s.termination_reason)
        .bind(&s.terminated_by)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<PrefillSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM prefill_session WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    /// Sessions whose container name matches the orphan-reconciliation
    /// prefix, used at startup (spec §4.M "orphan reconciliation").
    pub async fn sessions_with_container_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<PrefillSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM prefill_session WHERE container_name LIKE ?1 AND status = 'active'",
        )
        .bind(format!("{prefix}%"))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ---- PrefillHistoryEntry ----

    /// Starts a new `InProgress` entry, superseding any other `InProgress`
    /// entry for the same (session, app) with "Superseded by new attempt"
    /// (spec §3 invariant).
    pub async fn start_history_entry(
        &self,
        session_id: &str,
        app_id: i64,
        app_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query(
            "UPDATE prefill_history_entry
             SET status = 'cancelled', completed_at_utc = ?1, error_message = 'Superseded by new attempt'
             WHERE session_id = ?2 AND app_id = ?3 AND status = 'in_progress'",
        )
        .bind(now.to_rfc3339())
        .bind(session_id)
        .bind(app_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "INSERT INTO prefill_history_entry
             (session_id, app_id, app_name, started_at_utc, status, bytes_downloaded, total_bytes)
             VALUES (?1, ?2, ?3, ?4, 'in_progress', 0, 0)",
        )
        .bind(session_id)
        .bind(app_id)
        .bind(app_name)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn finalize_history_entry(
        &self,
        id: i64,
        status: PrefillHistoryStatus,
        bytes_downloaded: i64,
        total_bytes: i64,
        error_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE prefill_history_entry
             SET status = ?1, bytes_downloaded = ?2, total_bytes = ?3,
                 error_message = ?4, completed_at_utc = ?5
             WHERE id = ?6",
        )
        .bind(status.as_sql())
        .bind(bytes_downloaded)
        .bind(total_bytes)
        .bind(error_message)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn in_progress_entry(
        &self,
        session_id: &str,
    ) -> Result<Option<PrefillHistoryEntry>> {
        let row = sqlx::query_as::<_, HistoryRow>(
            "SELECT * FROM prefill_history_entry
             WHERE session_id = ?1 AND status = 'in_progress'
             ORDER BY id DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn history_for_session(&self, session_id: &str) -> Result<Vec<PrefillHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT * FROM prefill_history_entry WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Sum of bytes across finalized history entries, used to seed
    /// `TotalBytesTransferred` (spec §4.M).
    pub async fn finalized_bytes_total(&self, session_id: &str) -> Result<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(bytes_downloaded) FROM prefill_history_entry
             WHERE session_id = ?1 AND status != 'in_progress'",
        )
        .bind(session_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(total.unwrap_or(0))
    }

    // ---- PrefillCachedDepot ----

    pub async fn record_cached_depot(&self, d: &PrefillCachedDepot) -> Result<()> {
        sqlx::query(
            "INSERT INTO prefill_cached_depot
             (session_id, depot_id, manifest_id, total_bytes, recorded_at_utc)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(depot_id, manifest_id) DO UPDATE SET
                total_bytes = excluded.total_bytes,
                recorded_at_utc = excluded.recorded_at_utc",
        )
        .bind(&d.session_id)
        .bind(d.depot_id)
        .bind(&d.manifest_id)
        .bind(d.total_bytes)
        .bind(d.recorded_at_utc.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn cached_manifests(&self) -> Result<Vec<PrefillCachedDepot>> {
        let rows = sqlx::query_as::<_, CachedDepotRow>("SELECT * FROM prefill_cached_depot")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    created_by_session_id: Option<String>,
    container_id: Option<String>,
    container_name: Option<String>,
    status: String,
    steam_username: Option<String>,
    is_authenticated: bool,
    is_prefilling: bool,
    created_at_utc: String,
    expires_at_utc: String,
    ended_at_utc: Option<String>,
    termination_reason: Option<String>,
    terminated_by: Option<String>,
}

impl From<SessionRow> for PrefillSession {
    fn from(r: SessionRow) -> Self {
        Self {
            session_id: r.session_id,
            created_by_session_id: r.created_by_session_id,
            container_id: r.container_id,
            container_name: r.container_name,
            status: PrefillSessionStatus::from_sql(&r.status),
            steam_username: r.steam_username,
            is_authenticated: r.is_authenticated,
            is_prefilling: r.is_prefilling,
            created_at_utc: parse_dt(&r.created_at_utc),
            expires_at_utc: parse_dt(&r.expires_at_utc),
            ended_at_utc: r.ended_at_utc.as_deref().map(parse_dt),
            termination_reason: r.termination_reason,
            terminated_by: r.terminated_by,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    session_id: String,
    app_id: i64,
    app_name: Option<String>,
    started_at_utc: String,
    completed_at_utc: Option<String>,
    status: String,
    bytes_downloaded: i64,
    total_bytes: i64,
    error_message: Option<String>,
}

impl From<HistoryRow> for PrefillHistoryEntry {
    fn from(r: HistoryRow) -> Self {
        Self {
            id: r.id,
            session_id: r.session_id,
            app_id: r.app_id,
            app_name: r.app_name,
            started_at_utc: parse_dt(&r.started_at_utc),
            completed_at_utc: r.completed_at_utc.as_deref().map(parse_dt),
            status: PrefillHistoryStatus::from_sql(&r.status),
            bytes_downloaded: r.bytes_downloaded,
            total_bytes: r.total_bytes,
            error_message: r.error_message,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CachedDepotRow {
    session_id: String,
    depot_id: i64,
    manifest_id: String,
    total_bytes: i64,
    recorded_at_utc: String,
}

impl From<CachedDepotRow> for PrefillCachedDepot {
    fn from(r: CachedDepotRow) -> Self {
        Self {
            session_id: r.session_id,
            depot_id: r.depot_id,
            manifest_id: r.manifest_id,
            total_bytes: r.total_bytes,
            recorded_at_utc: parse_dt(&r.recorded_at_utc),
        }
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
#[path = "prefill_tests.rs"]
mod tests;
