// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

async fn store() -> OperationStateStore {
    OperationStateStore::new(Db::in_memory().await.unwrap())
}

#[tokio::test]
async fn save_then_get_round_trips() {
    let store = store().await;
    let record = OperationStateRecord {
        key: "CacheClearing_abc".into(),
        r#type: "CacheClearing".into(),
        status: "running".into(),
        message: "working".into(),
        data_blob: json!({"datasource": "steam"}),
        created_at: Utc::now(),
    };
    store.save_state(&record).await.unwrap();
    let fetched = store.get_state(&record.key).await.unwrap().unwrap();
    assert_eq!(fetched.status, "running");
    assert_eq!(fetched.data_blob, json!({"datasource": "steam"}));
}

#[tokio::test]
async fn save_is_upsert() {
    let store = store().await;
    let mut record = OperationStateRecord {
        key: "GameDetection_1".into(),
        r#type: "GameDetection".into(),
        status: "running".into(),
        message: "".into(),
        data_blob: json!({}),
        created_at: Utc::now(),
    };
    store.save_state(&record).await.unwrap();
    record.status = "completed".into();
    store.save_state(&record).await.unwrap();

    let all = store.get_all_states().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, "completed");
}

#[tokio::test]
async fn remove_state_deletes() {
    let store = store().await;
    let record = OperationStateRecord {
        key: "x".into(),
        r#type: "t".into(),
        status: "running".into(),
        message: "".into(),
        data_blob: json!({}),
        created_at: Utc::now(),
    };
    store.save_state(&record).await.unwrap();
    store.remove_state(&record.key).await.unwrap();
    assert!(store.get_state(&record.key).await.unwrap().is_none());
}

#[tokio::test]
async fn find_stale_running_only_matches_old_running_records() {
    let store = store().await;
    let old = OperationStateRecord {
        key: "old".into(),
        r#type: "CacheClearing".into(),
        status: "running".into(),
        message: "".into(),
        data_blob: json!({}),
        created_at: Utc::now() - chrono::Duration::seconds(600),
    };
    let fresh = OperationStateRecord {
        key: "fresh".into(),
        r#type: "CacheClearing".into(),
        status: "running".into(),
        message: "".into(),
        data_blob: json!({}),
        created_at: Utc::now(),
    };
    let done = OperationStateRecord {
        key: "done".into(),
        r#type: "CacheClearing".into(),
        status: "completed".into(),
        message: "".into(),
        data_blob: json!({}),
        created_at: Utc::now() - chrono::Duration::seconds(600),
    };
    for r in [&old, &fresh, &done] {
        store.save_state(r).await.unwrap();
    }

    let stale = store.find_stale_running(DEFAULT_RUNNING_CUTOFF_SECS).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].key, "old");
}

#[test]
fn key_for_matches_type_operation_id_convention() {
    assert_eq!(OperationStateStore::key_for("CacheClearing", "abc-123"), "CacheClearing_abc-123");
}
