// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lancache_storage::Db;
use tempfile::tempdir;

async fn service_async() -> (RemovalService, tempfile::TempDir) {
    let db = Db::in_memory().await.unwrap();
    let ops_dir = tempdir().unwrap();
    let tracker = Arc::new(UnifiedOperationTracker::new());
    let supervisor = Arc::new(NativeWorkerSupervisor::new());
    let bus = Arc::new(NotificationBus::new());
    let detections = Arc::new(DetectionStore::new(db));
    let corruption_detection = Arc::new(CorruptionDetectionService::new(
        tracker.clone(),
        supervisor.clone(),
        bus.clone(),
        detections.clone(),
        PathBuf::from("/nonexistent/corruption-detector"),
        ops_dir.path().to_path_buf(),
    ));
    let svc = RemovalService::new(
        tracker,
        supervisor,
        bus,
        detections,
        Arc::new(PauseGate::new()),
        Arc::new(NoopLogReopenSignal),
        corruption_detection,
        PathBuf::from("/nonexistent/game-cache-remover"),
        PathBuf::from("/nonexistent/service-remover"),
        PathBuf::from("/nonexistent/lancache.db"),
        ops_dir.path().to_path_buf(),
    );
    (svc, ops_dir)
}

fn ds(name: &str, writable: bool, path: &std::path::Path) -> Datasource {
    let mut d = Datasource::new(name, path.to_path_buf(), path.to_path_buf());
    d.cache_writable = writable;
    d.logs_writable = writable;
    d
}

#[test]
fn entity_key_lowercases_service_names_but_not_app_ids() {
    assert_eq!(Target::Game(730).entity_key(), "730");
    assert_eq!(Target::Service("Steam".to_string()).entity_key(), "steam");
}

#[test]
fn only_service_removal_requires_writable_logs() {
    assert!(!Target::Game(730).requires_writable_logs());
    assert!(Target::Service("steam".to_string()).requires_writable_logs());
}

#[tokio::test]
async fn game_removal_fails_when_no_datasource_has_writable_cache() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let err = svc.start_game_removal(730, vec![ds("a", false, dir.path())]).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::PermissionDenied(_))));
}

#[tokio::test]
async fn game_removal_ignores_log_writability() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let mut d = ds("a", true, dir.path());
    d.logs_writable = false;
    let id = svc.start_game_removal(730, vec![d]).await.unwrap();
    assert!(svc.tracker.get_operation(id).is_some());
}

#[tokio::test]
async fn service_removal_fails_when_logs_are_not_writable() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let mut d = ds("a", true, dir.path());
    d.logs_writable = false;
    let err = svc.start_service_removal("steam", vec![d]).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::PermissionDenied(_))));
}

#[tokio::test]
async fn second_concurrent_removal_of_same_game_is_rejected() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let _id = svc.start_game_removal(730, vec![ds("a", true, dir.path())]).await.unwrap();
    let err = svc.start_game_removal(730, vec![ds("a", true, dir.path())]).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::AlreadyInProgress(_))));
}

#[tokio::test]
async fn removal_of_different_games_does_not_collide() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    let _a = svc.start_game_removal(730, vec![ds("a", true, dir.path())]).await.unwrap();
    let b = svc.start_game_removal(440, vec![ds("a", true, dir.path())]).await.unwrap();
    assert!(svc.tracker.get_operation(b).is_some());
}

#[tokio::test]
async fn game_and_service_removal_of_the_same_name_do_not_collide() {
    let (svc, _ops_dir) = service_async().await;
    let dir = tempdir().unwrap();
    // "730" as a game app id vs. "730" as a (nonsensical but illustrative)
    // service name never contend, because they register under distinct
    // OperationTypes even though EntityKey happens to match.
    let _game = svc.start_game_removal(730, vec![ds("a", true, dir.path())]).await.unwrap();
    let service = svc.start_service_removal("730", vec![ds("a", true, dir.path())]).await.unwrap();
    assert!(svc.tracker.get_operation(service).is_some());
}
