// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Config;
use lancache_storage::{Db, OperationStateRecord};

async fn test_services() -> Services {
    let db = Db::in_memory().await.unwrap();
    crate::wiring::build(&Config::default(), db).await
}

#[tokio::test]
async fn stale_running_records_are_reinterpreted_as_failed() {
    let services = test_services().await;
    let stale = OperationStateRecord {
        key: "CacheClearing_abc".to_string(),
        r#type: "CacheClearing".to_string(),
        status: "running".to_string(),
        message: "in progress".to_string(),
        data_blob: serde_json::json!({}),
        created_at: chrono::Utc::now() - chrono::Duration::minutes(10),
    };
    services.state_store.save_state(&stale).await.unwrap();

    run(&services).await;

    let after = services.state_store.get_state(&stale.key).await.unwrap().unwrap();
    assert_eq!(after.status, "failed");
    assert_eq!(after.message, "Operation interrupted by service restart");
}

#[tokio::test]
async fn fresh_running_records_are_left_alone() {
    let services = test_services().await;
    let fresh = OperationStateRecord {
        key: "CacheClearing_fresh".to_string(),
        r#type: "CacheClearing".to_string(),
        status: "running".to_string(),
        message: "in progress".to_string(),
        data_blob: serde_json::json!({}),
        created_at: chrono::Utc::now(),
    };
    services.state_store.save_state(&fresh).await.unwrap();

    run(&services).await;

    let after = services.state_store.get_state(&fresh.key).await.unwrap().unwrap();
    assert_eq!(after.status, "running");
}

#[tokio::test]
async fn reconcile_is_a_noop_on_an_empty_store() {
    let services = test_services().await;
    run(&services).await;
    assert!(services.state_store.get_all_states().await.unwrap().is_empty());
}
