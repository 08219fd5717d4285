// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detection caches (spec §3): `CachedGameDetection`, `CachedServiceDetection`,
//! `CachedCorruptionDetection`. Full scans replace wholesale under one
//! transaction; incremental scans upsert by key and log-and-swallow benign
//! UNIQUE-constraint races (spec §4.I, §9).

use crate::db::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedGameDetection {
    pub game_app_id: i64,
    pub game_name: String,
    pub cache_files_found: i64,
    pub total_size_bytes: i64,
    pub depot_ids: Vec<i64>,
    pub sample_urls: Vec<String>,
    pub cache_file_paths: Vec<String>,
    pub datasources: Vec<String>,
    pub last_detected_utc: DateTime<Utc>,
    pub created_at_utc: DateTime<Utc>,
}

impl CachedGameDetection {
    pub fn is_unknown(&self) -> bool {
        self.game_name.starts_with("Unknown Game (Depot ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedServiceDetection {
    pub service_name: String,
    pub cache_files_found: i64,
    pub total_size_bytes: i64,
    pub sample_urls: Vec<String>,
    pub cache_file_paths: Vec<String>,
    pub datasources: Vec<String>,
    pub last_detected_utc: DateTime<Utc>,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedCorruptionDetection {
    pub service_name: String,
    pub corrupted_chunk_count: i64,
    pub last_detected_utc: DateTime<Utc>,
    pub created_at_utc: DateTime<Utc>,
}

pub struct DetectionStore {
    db: Db,
}

fn json_vec<T: Serialize>(v: &[T]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

fn parse_vec<T: for<'de> Deserialize<'de> + Default>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

impl DetectionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Replace-all: delete every row, then insert the batch, in one
    /// transaction (spec §4.I "full scans: delete-all then insert").
    pub async fn replace_all_games(&self, games: &[CachedGameDetection]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM cached_game_detection").execute(&mut *tx).await?;
        for g in games {
            insert_game(&mut tx, g).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Incremental upsert by `GameAppId`. A UNIQUE-constraint violation here
    /// would indicate a benign race with a concurrent scan; `ON CONFLICT`
    /// makes that race a no-op overwrite rather than an error, so there's
    /// nothing left to log-and-swallow at this layer.
    pub async fn upsert_game(&self, g: &CachedGameDetection) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        insert_game(&mut tx, g).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_game(&self, game_app_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM cached_game_detection WHERE game_app_id = ?1")
            .bind(game_app_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    pub async fn get_game(&self, game_app_id: i64) -> Result<Option<CachedGameDetection>> {
        let row = sqlx::query_as::<_, GameRow>(
            "SELECT * FROM cached_game_detection WHERE game_app_id = ?1",
        )
        .bind(game_app_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn all_games(&self) -> Result<Vec<CachedGameDetection>> {
        let rows = sqlx::query_as::<_, GameRow>("SELECT * FROM cached_game_detection")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn unknown_games(&self) -> Result<Vec<CachedGameDetection>> {
        Ok(self.all_games().await?.into_iter().filter(|g| g.is_unknown()).collect())
    }

    pub async fn replace_all_services(&self, services: &[CachedServiceDetection]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM cached_service_detection").execute(&mut *tx).await?;
        for s in services {
            insert_service(&mut tx, s).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_service(&self, s: &CachedServiceDetection) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        insert_service(&mut tx, s).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_service(&self, service_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM cached_service_detection WHERE service_name = ?1")
            .bind(service_name.to_ascii_lowercase())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    pub async fn all_services(&self) -> Result<Vec<CachedServiceDetection>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM cached_service_detection")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Replace-all for corruption results (spec §4.H: "transaction:
    /// delete-all, insert-all").
    pub async fn replace_all_corruption(&self, entries: &[CachedCorruptionDetection]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM cached_corruption_detection").execute(&mut *tx).await?;
        for e in entries {
            sqlx::query(
                "INSERT INTO cached_corruption_detection
                 (service_name, corrupted_chunk_count, last_detected_utc, created_at_utc)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&e.service_name)
            .bind(e.corrupted_chunk_count)
            .bind(e.last_detected_utc.to_rfc3339())
            .bind(e.created_at_utc.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn all_corruption(&self) -> Result<Vec<CachedCorruptionDetection>> {
        let rows = sqlx::query_as::<_, CorruptionRow>("SELECT * FROM cached_corruption_detection")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

async fn insert_game(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    g: &CachedGameDetection,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO cached_game_detection
         (game_app_id, game_name, cache_files_found, total_size_bytes, depot_ids,
          sample_urls, cache_file_paths, datasources, last_detected_utc, created_at_utc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(game_app_id) DO UPDATE SET
            game_name = excluded.game_name,
            cache_files_found = excluded.cache_files_found,
            total_size_bytes = excluded.total_size_bytes,
            depot_ids = excluded.depot_ids,
            sample_urls = excluded.sample_urls,
            cache_file_paths = excluded.cache_file_paths,
            datasources = excluded.datasources,
            last_detected_utc = excluded.last_detected_utc",
    )
    .bind(g.game_app_id)
    .bind(&g.game_name)
    .bind(g.cache_files_found)
    .bind(g.total_size_bytes)
    .bind(json_vec(&g.depot_ids))
    .bind(json_vec(&g.sample_urls))
    .bind(json_vec(&g.cache_file_paths))
    .bind(json_vec(&g.datasources))
    .bind(g.last_detected_utc.to_rfc3339())
    .bind(g.created_at_utc.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_service(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    s: &CachedServiceDetection,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO cached_service_detection
         (service_name, cache_files_found, total_size_bytes, sample_urls,
          cache_file_paths, datasources, last_detected_utc, created_at_utc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(service_name) DO UPDATE SET
            cache_files_found = excluded.cache_files_found,
            total_size_bytes = excluded.total_size_bytes,
            sample_urls = excluded.sample_urls,
            cache_file_paths = excluded.cache_file_paths,
            datasources = excluded.datasources,
            last_detected_utc = excluded.last_detected_utc",
    )
    .bind(s.service_name.to_ascii_lowercase())
    .bind(s.cache_files_found)
    .bind(s.total_size_bytes)
    .bind(json_vec(&s.sample_urls))
    .bind(json_vec(&s.cache_file_paths))
    .bind(json_vec(&s.datasources))
    .bind(s.last_detected_utc.to_rfc3339())
    .bind(s.created_at_utc.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct GameRow {
    game_app_id: i64,
    game_name: String,
    cache_files_found: i64,
    total_size_bytes: i64,
    depot_ids: String,
    sample_urls: String,
    cache_file_paths: String,
    datasources: String,
    last_detected_utc: String,
    created_at_utc: String,
}

impl From<GameRow> for CachedGameDetection {
    fn from(r: GameRow) -> Self {
        Self {
            game_app_id: r.game_app_id,
            game_name: r.game_name,
            cache_files_found: r.cache_files_found,
            total_size_bytes: r.total_size_bytes,
            depot_ids: parse_vec(&r.depot_ids),
            sample_urls: parse_vec(&r.sample_urls),
            cache_file_paths: parse_vec(&r.cache_file_paths),
            datasources: parse_vec(&r.datasources),
            last_detected_utc: parse_dt(&r.last_detected_utc),
            created_at_utc: parse_dt(&r.created_at_utc),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    service_name: String,
    cache_files_found: i64,
    total_size_bytes: i64,
    sample_urls: String,
    cache_file_paths: String,
    datasources: String,
    last_detected_utc: String,
    created_at_utc: String,
}

impl From<ServiceRow> for CachedServiceDetection {
    fn from(r: ServiceRow) -> Self {
        Self {
            service_name: r.service_name,
            cache_files_found: r.cache_files_found,
            total_size_bytes: r.total_size_bytes,
            sample_urls: parse_vec(&r.sample_urls),
            cache_file_paths: parse_vec(&r.cache_file_paths),
            datasources: parse_vec(&r.datasources),
            last_detected_utc: parse_dt(&r.last_detected_utc),
            created_at_utc: parse_dt(&r.created_at_utc),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CorruptionRow {
    service_name: String,
    corrupted_chunk_count: i64,
    last_detected_utc: String,
    created_at_utc: String,
}

impl From<CorruptionRow> for CachedCorruptionDetection {
    fn from(r: CorruptionRow) -> Self {
        Self {
            service_name: r.service_name,
            corrupted_chunk_count: r.corrupted_chunk_count,
            last_detected_utc: parse_dt(&r.last_detected_utc),
            created_at_utc: parse_dt(&r.created_at_utc),
        }
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
#[path = "detections_tests.rs"]
mod tests;
