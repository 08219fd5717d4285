// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `BannedSteamUser` (spec §3, §4.M scenario 4): a username-keyed ban list
//! consulted by the prefill auth state machine at the username step.

use crate::db::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BannedSteamUser {
    pub username: String,
    pub reason: Option<String>,
    pub banned_at_utc: DateTime<Utc>,
    pub expires_at_utc: Option<DateTime<Utc>>,
    pub is_lifted: bool,
    pub lifted_at_utc: Option<DateTime<Utc>>,
}

impl BannedSteamUser {
    /// A ban is active iff not lifted and not expired (spec §3).
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.is_lifted {
            return false;
        }
        match self.expires_at_utc {
            Some(expires) => expires > now,
            None => true,
        }
    }
}

pub struct BanStore {
    db: Db,
}

impl BanStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn ban(&self, ban: &BannedSteamUser) -> Result<()> {
        let username = ban.username.to_ascii_lowercase();
        sqlx::query(
            "INSERT INTO banned_steam_user
             (username, reason, banned_at_utc, expires_at_utc, is_lifted, lifted_at_utc)
             VALUES (?1, ?2, ?3, ?4, 0, NULL)
             ON CONFLICT(username) DO UPDATE SET
                reason = excluded.reason,
                banned_at_utc = excluded.banned_at_utc,
                expires_at_utc = excluded.expires_at_utc,
                is_lifted = 0,
                lifted_at_utc = NULL",
        )
        .bind(&username)
        .bind(&ban.reason)
        .bind(ban.banned_at_utc.to_rfc3339())
        .bind(ban.expires_at_utc.map(|d| d.to_rfc3339()))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn lift(&self, username: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE banned_steam_user SET is_lifted = 1, lifted_at_utc = ?1 WHERE username = ?2",
        )
        .bind(now.to_rfc3339())
        .bind(username.to_ascii_lowercase())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Looks up a username (case-insensitively) and reports whether an
    /// active ban exists right now.
    pub async fn find_active(&self, username: &str) -> Result<Option<BannedSteamUser>> {
        let row = sqlx::query_as::<_, Row>("SELECT * FROM banned_steam_user WHERE username = ?1")
            .bind(username.to_ascii_lowercase())
            .fetch_optional(self.db.pool())
            .await?;
        let Some(row) = row else { return Ok(None) };
        let ban: BannedSteamUser = row.into();
        Ok(if ban.is_active(Utc::now()) { Some(ban) } else { None })
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    username: String,
    reason: Option<String>,
    banned_at_utc: String,
    expires_at_utc: Option<String>,
    is_lifted: bool,
    lifted_at_utc: Option<String>,
}

impl From<Row> for BannedSteamUser {
    fn from(r: Row) -> Self {
        Self {
            username: r.username,
            reason: r.reason,
            banned_at_utc: parse_dt(&r.banned_at_utc),
            expires_at_utc: r.expires_at_utc.as_deref().map(parse_dt),
            is_lifted: r.is_lifted,
            lifted_at_utc: r.lifted_at_utc.as_deref().map(parse_dt),
        }
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
#[path = "bans_tests.rs"]
mod tests;
