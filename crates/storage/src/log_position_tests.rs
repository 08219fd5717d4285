// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

async fn store() -> LogPositionStore {
    LogPositionStore::new(Db::in_memory().await.unwrap())
}

#[tokio::test]
async fn unknown_datasource_has_no_persisted_position() {
    let store = store().await;
    assert_eq!(store.get("steam").await.unwrap(), None);
}

#[tokio::test]
async fn save_then_get_round_trips() {
    let store = store().await;
    store.save("steam", LogPosition { line_position: 42, logs_ever_processed: true }).await.unwrap();
    let got = store.get("steam").await.unwrap().unwrap();
    assert_eq!(got.line_position, 42);
    assert!(got.logs_ever_processed);
}

#[tokio::test]
async fn save_overwrites_the_previous_position() {
    let store = store().await;
    store.save("steam", LogPosition { line_position: 10, logs_ever_processed: false }).await.unwrap();
    store.save("steam", LogPosition { line_position: 20, logs_ever_processed: true }).await.unwrap();
    let got = store.get("steam").await.unwrap().unwrap();
    assert_eq!(got.line_position, 20);
    assert!(got.logs_ever_processed);
}
