// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lancache_storage::Db;
use tempfile::tempdir;

async fn service_async() -> (CacheClearingService, tempfile::TempDir) {
    let db = Db::in_memory().await.unwrap();
    let ops_dir = tempdir().unwrap();
    let svc = CacheClearingService::new(
        Arc::new(UnifiedOperationTracker::new()),
        Arc::new(NativeWorkerSupervisor::new()),
        Arc::new(NotificationBus::new()),
        Arc::new(OperationStateStore::new(db)),
        PathBuf::from("/nonexistent/cache-cleaner"),
        ops_dir.path().to_path_buf(),
    );
    (svc, ops_dir)
}

fn ds(name: &str, writable: bool, path: &Path) -> Datasource {
    let mut d = Datasource::new(name, path.to_path_buf(), path.to_path_buf());
    d.cache_writable = writable;
    d.logs_writable = writable;
    d
}

#[test]
fn hex_bucket_name_detection() {
    assert!("ab".chars().all(|c| c.is_ascii_hexdigit()) && "ab".len() == 2);
    assert!(!("abc".len() == 2));
    assert!(!"zz".chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn count_hex_buckets_ignores_non_bucket_entries() {
    let dir = tempdir().unwrap();
    tokio::fs::create_dir(dir.path().join("ab")).await.unwrap();
    tokio::fs::create_dir(dir.path().join("0f")).await.unwrap();
    tokio::fs::create_dir(dir.path().join("zz")).await.unwrap();
    tokio::fs::create_dir(dir.path().join("not-a-bucket")).await.unwrap();
    tokio::fs::write(dir.path().join("ab_file"), b"x").await.unwrap();

    assert_eq!(count_hex_buckets(dir.path()).await, 2);
}

#[tokio::test]
async fn start_clear_fails_when_only_datasource_is_read_only() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let err = svc
        .start_clear(vec![ds("a", false, dir.path())], None, DeleteMode::Preserve)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::PermissionDenied(_))));
}

#[tokio::test]
async fn start_clear_skips_read_only_and_proceeds_with_writable_one() {
    let (svc, _ops_dir) = service_async().await;
    let writable_dir = tempdir().unwrap();
    let readonly_dir = tempdir().unwrap();
    let id = svc
        .start_clear(
            vec![ds("a", true, writable_dir.path()), ds("b", false, readonly_dir.path())],
            None,
            DeleteMode::Preserve,
        )
        .await
        .unwrap();
    // Operation registered even though the spawned worker binary doesn't
    // exist; the background task will fail it shortly after.
    assert!(svc.tracker.get_operation(id).is_some());
}

#[tokio::test]
async fn start_clear_rejects_unknown_target_name() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let err = svc
        .start_clear(vec![ds("a", true, dir.path())], Some("nonexistent"), DeleteMode::Preserve)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NotFound(_))));
}

#[tokio::test]
async fn second_concurrent_clear_is_rejected_as_already_in_progress() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let _id = svc
        .start_clear(vec![ds("a", true, dir.path())], None, DeleteMode::Preserve)
        .await
        .unwrap();
    let err = svc
        .start_clear(vec![ds("a", true, dir.path())], None, DeleteMode::Preserve)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::AlreadyInProgress(_))));
}
