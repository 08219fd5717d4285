// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lancache_storage::Db;
use tempfile::tempdir;

async fn service_async() -> (GameCacheDetectionService, tempfile::TempDir) {
    let db = Db::in_memory().await.unwrap();
    let ops_dir = tempdir().unwrap();
    let svc = GameCacheDetectionService::new(
        Arc::new(UnifiedOperationTracker::new()),
        Arc::new(NativeWorkerSupervisor::new()),
        Arc::new(NotificationBus::new()),
        Arc::new(DetectionStore::new(db.clone())),
        Arc::new(DepotMappingStore::new(db.clone())),
        Arc::new(OperationStateStore::new(db)),
        PathBuf::from("/nonexistent/game-cache-detector"),
        PathBuf::from("/nonexistent/lancache.db"),
        ops_dir.path().to_path_buf(),
    );
    (svc, ops_dir)
}

fn ds(name: &str, path: &std::path::Path) -> Datasource {
    Datasource::new(name, path.to_path_buf(), path.to_path_buf())
}

fn game(app_id: i64, name: &str, depot_ids: Vec<i64>) -> GameDetectorGame {
    GameDetectorGame {
        game_app_id: app_id,
        game_name: name.to_string(),
        cache_files_found: 3,
        total_size_bytes: 1024,
        depot_ids,
        sample_urls: vec!["http://example.invalid/a".to_string()],
        cache_file_paths: vec!["a/b".to_string()],
    }
}

#[tokio::test]
async fn start_scan_rejects_when_no_enabled_datasources() {
    let (svc, _ops_dir) = service_async().await;
    let mut d = ds("a", std::path::Path::new("/tmp"));
    d.enabled = false;
    let err = svc.start_scan(vec![d], false).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NotFound(_))));
}

#[tokio::test]
async fn start_scan_registers_operation() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let id = svc.start_scan(vec![ds("a", dir.path())], false).await.unwrap();
    assert!(svc.tracker.get_operation(id).is_some());
}

#[tokio::test]
async fn second_concurrent_scan_is_rejected_as_already_in_progress() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let _id = svc.start_scan(vec![ds("a", dir.path())], false).await.unwrap();
    let err = svc.start_scan(vec![ds("a", dir.path())], false).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::AlreadyInProgress(_))));
}

#[test]
fn merge_games_sums_counts_and_unions_depots() {
    let mut acc = HashMap::new();
    let now = chrono::Utc::now();
    merge_games(&mut acc, vec![game(440, "Team Fortress 2", vec![441])], "ds-a", now);
    merge_games(&mut acc, vec![game(440, "Team Fortress 2", vec![442])], "ds-b", now);

    let merged = acc.get(&440).unwrap();
    assert_eq!(merged.cache_files_found, 6);
    assert_eq!(merged.total_size_bytes, 2048);
    assert_eq!(merged.depot_ids.len(), 2);
    assert_eq!(merged.datasources.len(), 2);
}

#[test]
fn merge_games_caps_sample_urls_at_five() {
    let mut acc = HashMap::new();
    let now = chrono::Utc::now();
    for i in 0..10 {
        let mut g = game(100, "App", vec![101]);
        g.sample_urls = vec![format!("http://example.invalid/{i}")];
        merge_games(&mut acc, vec![g], "ds", now);
    }
    assert_eq!(acc.get(&100).unwrap().sample_urls.len(), MAX_SAMPLE_URLS);
}

#[test]
fn merge_services_dedups_case_insensitively() {
    let mut acc = HashMap::new();
    let now = chrono::Utc::now();
    let svc_a = GameDetectorService {
        service_name: "Steam".to_string(),
        cache_files_found: 1,
        total_size_bytes: 10,
        sample_urls: vec![],
        cache_file_paths: vec![],
    };
    let mut svc_b = svc_a.clone();
    svc_b.service_name = "STEAM".to_string();
    svc_b.cache_files_found = 2;

    merge_services(&mut acc, vec![svc_a], "ds-a", now);
    merge_services(&mut acc, vec![svc_b], "ds-b", now);

    assert_eq!(acc.len(), 1);
    assert_eq!(acc.get("steam").unwrap().cache_files_found, 3);
}
