// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn ban(username: &str) -> BannedSteamUser {
    BannedSteamUser {
        username: username.to_string(),
        reason: Some("chargeback".into()),
        banned_at_utc: Utc::now(),
        expires_at_utc: None,
        is_lifted: false,
        lifted_at_utc: None,
    }
}

#[tokio::test]
async fn find_active_matches_case_insensitively() {
    let store = BanStore::new(Db::in_memory().await.unwrap());
    store.ban(&ban("alice")).await.unwrap();
    assert!(store.find_active("Alice").await.unwrap().is_some());
    assert!(store.find_active("ALICE").await.unwrap().is_some());
}

#[tokio::test]
async fn lifted_ban_is_not_active() {
    let store = BanStore::new(Db::in_memory().await.unwrap());
    store.ban(&ban("bob")).await.unwrap();
    store.lift("bob", Utc::now()).await.unwrap();
    assert!(store.find_active("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn expired_ban_is_not_active() {
    let store = BanStore::new(Db::in_memory().await.unwrap());
    let mut b = ban("carol");
    b.expires_at_utc = Some(Utc::now() - chrono::Duration::hours(1));
    store.ban(&b).await.unwrap();
    assert!(store.find_active("carol").await.unwrap().is_none());
}

#[tokio::test]
async fn future_expiry_is_still_active() {
    let store = BanStore::new(Db::in_memory().await.unwrap());
    let mut b = ban("dave");
    b.expires_at_utc = Some(Utc::now() + chrono::Duration::hours(1));
    store.ban(&b).await.unwrap();
    assert!(store.find_active("dave").await.unwrap().is_some());
}

#[tokio::test]
async fn rebanning_clears_previous_lift() {
    let store = BanStore::new(Db::in_memory().await.unwrap());
    store.ban(&ban("erin")).await.unwrap();
    store.lift("erin", Utc::now()).await.unwrap();
    store.ban(&ban("erin")).await.unwrap();
    assert!(store.find_active("erin").await.unwrap().is_some());
}
