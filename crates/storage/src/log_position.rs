// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-datasource tail position for the Live Log Monitor (spec §4.K).
//!
//! Distinct from the Operation State Store: this isn't crash-recovery state
//! for an in-flight operation, it's the durable "where did we leave off"
//! marker the monitor consults on every tick and at startup.

use crate::db::Db;
use crate::error::Result;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub line_position: u64,
    pub logs_ever_processed: bool,
}

pub struct LogPositionStore {
    db: Db,
}

impl LogPositionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get(&self, datasource_name: &str) -> Result<Option<LogPosition>> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT line_position, logs_ever_processed FROM log_monitor_position WHERE datasource_name = ?1",
        )
        .bind(datasource_name)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|r| LogPosition { line_position: r.line_position as u64, logs_ever_processed: r.logs_ever_processed }))
    }

    pub async fn save(&self, datasource_name: &str, position: LogPosition) -> Result<()> {
        sqlx::query(
            "INSERT INTO log_monitor_position (datasource_name, line_position, logs_ever_processed, updated_at_utc)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(datasource_name) DO UPDATE SET
                line_position = excluded.line_position,
                logs_ever_processed = excluded.logs_ever_processed,
                updated_at_utc = excluded.updated_at_utc",
        )
        .bind(datasource_name)
        .bind(position.line_position as i64)
        .bind(position.logs_ever_processed)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    line_position: i64,
    logs_ever_processed: bool,
}

#[cfg(test)]
#[path = "log_position_tests.rs"]
mod tests;
