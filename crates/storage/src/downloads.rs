// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Download` records (spec §3) and the query the Depot Mapping Backfill
//! (spec §4.L) uses to find candidates needing a game-name attached.

use crate::db::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Download {
    pub id: String,
    pub service: String,
    pub depot_id: Option<i64>,
    pub game_app_id: Option<i64>,
    pub game_name: Option<String>,
    pub game_image_url: Option<String>,
    pub start_time_utc: DateTime<Utc>,
}

pub struct DownloadStore {
    db: Db,
}

/// Backfill batch size (spec §4.L: "limit 50").
pub const BACKFILL_BATCH_SIZE: i64 = 50;
/// Backfill lookback window (spec §4.L: "within the last 24 h").
pub const BACKFILL_LOOKBACK_HOURS: i64 = 24;

impl DownloadStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn insert(&self, d: &Download) -> Result<()> {
        sqlx::query(
            "INSERT INTO downloads
             (id, service, depot_id, game_app_id, game_name, game_image_url, start_time_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&d.id)
        .bind(&d.service)
        .bind(d.depot_id)
        .bind(d.game_app_id)
        .bind(&d.game_name)
        .bind(&d.game_image_url)
        .bind(d.start_time_utc.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Downloads with `Service="steam"`, a depot id, no resolved app id yet,
    /// started within the lookback window — exactly spec §4.L's selection.
    pub async fn unresolved_steam_downloads(&self, limit: i64) -> Result<Vec<Download>> {
        let cutoff = (Utc::now() - chrono::Duration::hours(BACKFILL_LOOKBACK_HOURS)).to_rfc3339();
        let rows = sqlx::query_as::<_, Row>(
            "SELECT * FROM downloads
             WHERE service = 'steam'
               AND depot_id IS NOT NULL
               AND game_app_id IS NULL
               AND start_time_utc >= ?1
             ORDER BY start_time_utc DESC
             LIMIT ?2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Attaches a resolved game identity to a batch of download ids in one
    /// transaction (spec §4.L: "commits in one transaction").
    pub async fn attach_game_identity(
        &self,
        resolutions: &[(String, i64, Option<String>, Option<String>)],
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        for (id, app_id, name, image_url) in resolutions {
            sqlx::query(
                "UPDATE downloads SET game_app_id = ?1, game_name = ?2, game_image_url = ?3
                 WHERE id = ?4",
            )
            .bind(app_id)
            .bind(name)
            .bind(image_url)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    service: String,
    depot_id: Option<i64>,
    game_app_id: Option<i64>,
    game_name: Option<String>,
    game_image_url: Option<String>,
    start_time_utc: String,
}

impl From<Row> for Download {
    fn from(r: Row) -> Self {
        Self {
            id: r.id,
            service: r.service,
            depot_id: r.depot_id,
            game_app_id: r.game_app_id,
            game_name: r.game_name,
            game_image_url: r.game_image_url,
            start_time_utc: DateTime::parse_from_rfc3339(&r.start_time_utc)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[cfg(test)]
#[path = "downloads_tests.rs"]
mod tests;
