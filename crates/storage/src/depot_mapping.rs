// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SteamDepotMapping` (spec §3): a many-to-many depot→app relationship,
//! with "owner" rows designating the canonical app for a depot.

use crate::db::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SteamDepotMapping {
    pub depot_id: i64,
    pub app_id: i64,
    pub app_name: Option<String>,
    pub is_owner: bool,
    pub source: String,
    pub discovered_at: DateTime<Utc>,
}

pub struct DepotMappingStore {
    db: Db,
}

impl DepotMappingStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, m: &SteamDepotMapping) -> Result<()> {
        sqlx::query(
            "INSERT INTO steam_depot_mapping
             (depot_id, app_id, app_name, is_owner, source, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(depot_id, app_id) DO UPDATE SET
                app_name = excluded.app_name,
                is_owner = excluded.is_owner,
                source = excluded.source",
        )
        .bind(m.depot_id)
        .bind(m.app_id)
        .bind(&m.app_name)
        .bind(m.is_owner)
        .bind(&m.source)
        .bind(m.discovered_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// The canonical app for a depot, if one has been discovered.
    pub async fn owner_for_depot(&self, depot_id: i64) -> Result<Option<SteamDepotMapping>> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT * FROM steam_depot_mapping WHERE depot_id = ?1 AND is_owner = 1 LIMIT 1",
        )
        .bind(depot_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    /// Batch lookup of owner rows for a set of depot ids, used by the
    /// backfill pass (spec §4.L) to avoid one query per download record.
    pub async fn owners_for_depots(
        &self,
        depot_ids: &[i64],
    ) -> Result<std::collections::HashMap<i64, SteamDepotMapping>> {
        let mut out = std::collections::HashMap::new();
        for &depot_id in depot_ids {
            if let Some(owner) = self.owner_for_depot(depot_id).await? {
                out.insert(depot_id, owner);
            }
        }
        Ok(out)
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    depot_id: i64,
    app_id: i64,
    app_name: Option<String>,
    is_owner: bool,
    source: String,
    discovered_at: String,
}

impl From<Row> for SteamDepotMapping {
    fn from(r: Row) -> Self {
        Self {
            depot_id: r.depot_id,
            app_id: r.app_id,
            app_name: r.app_name,
            is_owner: r.is_owner,
            source: r.source,
            discovered_at: DateTime::parse_from_rfc3339(&r.discovered_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[cfg(test)]
#[path = "depot_mapping_tests.rs"]
mod tests;
