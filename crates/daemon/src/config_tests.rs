// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;

#[test]
fn empty_file_falls_back_entirely_to_defaults() {
    let cfg = Config::from_json("{}", Path::new("config.json")).unwrap();
    assert_eq!(cfg.data_root, PathBuf::from("/data"));
    assert!(cfg.datasources.is_empty());
    assert_eq!(cfg.corruption_threshold, 5);
    assert_eq!(cfg.prefill.docker_image, "lancache-prefill:latest");
}

#[test]
fn partial_file_overrides_only_the_fields_it_sets() {
    let json = r#"{
        "data_root": "/srv/lancache",
        "corruption_threshold": 10,
        "datasources": [
            {"name": "steam", "cache_path": "/cache/steam", "log_path": "/logs/steam"}
        ]
    }"#;
    let cfg = Config::from_json(json, Path::new("config.json")).unwrap();
    assert_eq!(cfg.data_root, PathBuf::from("/srv/lancache"));
    assert_eq!(cfg.corruption_threshold, 10);
    assert_eq!(cfg.datasources.len(), 1);
    assert_eq!(cfg.datasources[0].name, "steam");
    assert!(cfg.datasources[0].enabled);
    // Untouched fields keep their defaults.
    assert_eq!(cfg.steam_probe_url, "https://steamcontent.com");
}

#[test]
fn datasource_enabled_defaults_to_true_when_omitted() {
    let json = r#"{"datasources": [{"name": "a", "cache_path": "/a", "log_path": "/a"}]}"#;
    let cfg = Config::from_json(json, Path::new("config.json")).unwrap();
    assert!(cfg.datasources[0].enabled);
}

#[test]
fn prefill_network_mode_host_maps_to_host_override() {
    let json = r#"{"prefill": {"network_mode": "host"}}"#;
    let cfg = Config::from_json(json, Path::new("config.json")).unwrap();
    assert_eq!(cfg.prefill.network_override, Some(NetworkOverride::Host));
}

#[test]
fn prefill_network_mode_named_maps_to_named_override() {
    let json = r#"{"prefill": {"network_mode": "lancache_default"}}"#;
    let cfg = Config::from_json(json, Path::new("config.json")).unwrap();
    assert_eq!(cfg.prefill.network_override, Some(NetworkOverride::Named("lancache_default".to_string())));
}

#[test]
fn malformed_json_is_a_parse_error_not_a_panic() {
    let err = Config::from_json("{not json", Path::new("config.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn session_timeout_minutes_converts_to_duration() {
    let json = r#"{"prefill": {"session_timeout_minutes": 30}}"#;
    let cfg = Config::from_json(json, Path::new("config.json")).unwrap();
    assert_eq!(cfg.prefill.session_timeout, Duration::from_secs(30 * 60));
}
