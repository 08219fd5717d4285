// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

#[derive(Debug, Deserialize, PartialEq)]
struct Sample {
    percent: u32,
}

#[tokio::test]
async fn read_progress_file_returns_none_when_missing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.json");
    let got: Option<Sample> = read_progress_file(&path).await;
    assert!(got.is_none());
}

#[tokio::test]
async fn read_progress_file_returns_none_on_truncated_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("progress.json");
    tokio::fs::write(&path, b"{\"percent\": 5").await.unwrap();
    let got: Option<Sample> = read_progress_file(&path).await;
    assert!(got.is_none());
}

#[tokio::test]
async fn read_progress_file_parses_valid_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("progress.json");
    tokio::fs::write(&path, b"{\"percent\": 42}").await.unwrap();
    let got: Option<Sample> = read_progress_file(&path).await;
    assert_eq!(got, Some(Sample { percent: 42 }));
}

#[tokio::test]
async fn poll_progress_stops_on_cancel() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("progress.json");
    tokio::fs::write(&path, b"{\"percent\": 1}").await.unwrap();
    let cancel = CancellationToken::new();
    let updates = Arc::new(Mutex::new(Vec::new()));
    let updates_clone = updates.clone();
    let cancel_clone = cancel.clone();

    let task = tokio::spawn(async move {
        poll_progress::<Sample, _>(&path, Duration::from_millis(10), &cancel_clone, move |v| {
            updates_clone.lock().unwrap().push(v.percent);
        })
        .await;
    });

    tokio::time::sleep(Duration::from_millis(35)).await;
    cancel.cancel();
    task.await.unwrap();

    assert!(!updates.lock().unwrap().is_empty());
}
