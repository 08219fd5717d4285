// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn log_manager_progress_parses_camel_free_json() {
    let raw = r#"{
        "is_processing": true,
        "percent_complete": 42,
        "status": "running",
        "message": "counting",
        "lines_processed": 1000,
        "service_counts": {"steam": 900, "origin": 100}
    }"#;
    let p: LogManagerProgress = serde_json::from_str(raw).unwrap();
    assert_eq!(p.percent_complete(), 42);
    assert_eq!(p.service_counts.get("steam"), Some(&900));
}

#[test]
fn corruption_progress_uses_camelcase_keys() {
    let raw = r#"{
        "status": "scanning",
        "message": "scanning chunk",
        "filesProcessed": 10,
        "totalFiles": 100,
        "percentComplete": 10,
        "currentFile": "a.chunk",
        "timestamp": "2026-07-28T00:00:00Z"
    }"#;
    let p: CorruptionProgress = serde_json::from_str(raw).unwrap();
    assert_eq!(p.files_processed, 10);
    assert_eq!(p.current_file.as_deref(), Some("a.chunk"));
}

#[test]
fn delete_mode_round_trips_lowercase() {
    assert_eq!(DeleteMode::Rsync.as_cli_arg(), "rsync");
    let v = serde_json::to_value(DeleteMode::Full).unwrap();
    assert_eq!(v, serde_json::json!("full"));
}

#[test]
fn game_detector_output_defaults_missing_arrays() {
    let raw = r#"{"total_games_detected": 0, "total_services_detected": 0}"#;
    let out: GameDetectorOutput = serde_json::from_str(raw).unwrap();
    assert!(out.games.is_empty());
    assert!(out.services.is_empty());
}

#[test]
fn cache_cleaner_progress_tracks_active_directories() {
    let raw = r#"{
        "is_processing": true,
        "percent_complete": 50,
        "status": "cleaning",
        "message": "",
        "directories_processed": 5,
        "total_directories": 10,
        "bytes_deleted": 1024,
        "files_deleted": 3,
        "active_directories": ["ab", "cd"],
        "active_count": 2
    }"#;
    let p: CacheCleanerProgress = serde_json::from_str(raw).unwrap();
    assert_eq!(p.active_directories, vec!["ab".to_string(), "cd".to_string()]);
}
