// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn session(id: &str) -> PrefillSession {
    let now = Utc::now();
    PrefillSession {
        session_id: id.to_string(),
        created_by_session_id: Some("web-1".into()),
        container_id: Some("abc123".into()),
        container_name: Some(format!("lancache-prefill-{id}")),
        status: PrefillSessionStatus::Active,
        steam_username: None,
        is_authenticated: false,
        is_prefilling: false,
        created_at_utc: now,
        expires_at_utc: now + chrono::Duration::minutes(120),
        ended_at_utc: None,
        termination_reason: None,
        terminated_by: None,
    }
}

#[tokio::test]
async fn upsert_session_round_trips() {
    let store = PrefillStore::new(Db::in_memory().await.unwrap());
    store.upsert_session(&session("ses-1")).await.unwrap();
    let loaded = store.get_session("ses-1").await.unwrap().unwrap();
    assert_eq!(loaded.status, PrefillSessionStatus::Active);
    assert_eq!(loaded.container_id.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn sessions_with_container_prefix_only_matches_active() {
    let store = PrefillStore::new(Db::in_memory().await.unwrap());
    store.upsert_session(&session("ses-1")).await.unwrap();
    let mut terminated = session("ses-2");
    terminated.status = PrefillSessionStatus::Terminated;
    store.upsert_session(&terminated).await.unwrap();

    let orphans = store.sessions_with_container_prefix("lancache-prefill-").await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].session_id, "ses-1");
}

#[tokio::test]
async fn starting_new_entry_supersedes_prior_in_progress() {
    let store = PrefillStore::new(Db::in_memory().await.unwrap());
    let now = Utc::now();
    let first = store.start_history_entry("ses-1", 100, Some("Game A"), now).await.unwrap();
    let _second = store
        .start_history_entry("ses-1", 100, Some("Game A"), now + chrono::Duration::seconds(5))
        .await
        .unwrap();

    let history = store.history_for_session("ses-1").await.unwrap();
    let superseded = history.iter().find(|e| e.id == first).unwrap();
    assert_eq!(superseded.status, PrefillHistoryStatus::Cancelled);
    assert_eq!(superseded.error_message.as_deref(), Some("Superseded by new attempt"));

    let current = store.in_progress_entry("ses-1").await.unwrap().unwrap();
    assert_ne!(current.id, first);
}

#[tokio::test]
async fn finalize_sets_bytes_and_status() {
    let store = PrefillStore::new(Db::in_memory().await.unwrap());
    let now = Utc::now();
    let id = store.start_history_entry("ses-1", 200, None, now).await.unwrap();
    store
        .finalize_history_entry(id, PrefillHistoryStatus::Completed, 1024, 1024, None, now)
        .await
        .unwrap();

    assert!(store.in_progress_entry("ses-1").await.unwrap().is_none());
    assert_eq!(store.finalized_bytes_total("ses-1").await.unwrap(), 1024);
}

#[tokio::test]
async fn record_cached_depot_upserts_by_depot_and_manifest() {
    let store = PrefillStore::new(Db::in_memory().await.unwrap());
    let entry = PrefillCachedDepot {
        session_id: "ses-1".into(),
        depot_id: 228990,
        manifest_id: "m1".into(),
        total_bytes: 100,
        recorded_at_utc: Utc::now(),
    };
    store.record_cached_depot(&entry).await.unwrap();
    let mut updated = entry.clone();
    updated.total_bytes = 200;
    store.record_cached_depot(&updated).await.unwrap();

    let all = store.cached_manifests().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].total_bytes, 200);
}
