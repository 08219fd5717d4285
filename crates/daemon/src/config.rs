// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration (`SPEC_FULL.md` "Configuration"): a `Config` struct
//! deserialized from a JSON file, with `toml`-shaped in-process defaults
//! merged in for anything the file omits, and the handful of environment
//! variables spec §6 names applied last.
//!
//! The JSON file itself is produced by an external loader (spec §1 "the
//! JSON configuration loader" is out of scope); this module only owns the
//! shape of the data once loaded and how it's merged with defaults.

use lancache_prefill::{NetworkOverride, PrefillConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatasourceConfig {
    pub name: String,
    pub cache_path: PathBuf,
    pub log_path: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Mirrors the `Prefill:*` keys from spec §6; every field is optional in
/// the file and falls back to [`PrefillConfig::default`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PrefillFileSection {
    pub docker_image: Option<String>,
    pub epic_docker_image: Option<String>,
    pub daemon_base_path: Option<PathBuf>,
    pub host_data_path: Option<PathBuf>,
    pub use_tcp: Option<bool>,
    pub tcp_port: Option<u16>,
    pub host_tcp_port: Option<u16>,
    pub tcp_host: Option<String>,
    pub network_mode: Option<String>,
    pub lancache_dns_ip: Option<String>,
    pub lancache_dns_network: Option<String>,
    pub lancache_dns_container: Option<String>,
    pub session_timeout_minutes: Option<u64>,
}

impl PrefillFileSection {
    fn merge_into(self, mut base: PrefillConfig) -> PrefillConfig {
        if let Some(v) = self.docker_image {
            base.docker_image = v;
        }
        if let Some(v) = self.epic_docker_image {
            base.epic_docker_image = v;
        }
        if let Some(v) = self.daemon_base_path {
            base.sessions_root = v;
        }
        if let Some(v) = self.host_data_path {
            base.host_data_path = Some(v);
        }
        if let Some(v) = self.use_tcp {
            base.use_tcp = v;
        }
        if let Some(v) = self.tcp_port {
            base.tcp_port = v;
        }
        if let Some(v) = self.host_tcp_port {
            base.host_tcp_port = v;
        }
        if let Some(v) = self.tcp_host {
            base.tcp_host = v;
        }
        if let Some(v) = self.network_mode {
            base.network_override = match v.as_str() {
                "host" => Some(NetworkOverride::Host),
                "" => None,
                other => Some(NetworkOverride::Named(other.to_string())),
            };
        }
        if let Some(v) = self.lancache_dns_ip {
            base.lancache_dns_ip = Some(v);
        }
        if let Some(v) = self.lancache_dns_network {
            base.lancache_dns_network = v;
        }
        if let Some(v) = self.lancache_dns_container {
            base.lancache_dns_container = v;
        }
        if let Some(v) = self.session_timeout_minutes {
            base.session_timeout = Duration::from_secs(v * 60);
        }
        base
    }
}

/// Everything in the JSON file is optional; anything absent is taken from
/// [`Config::default`]'s in-process defaults.
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    data_root: Option<PathBuf>,
    helper_bin_dir: Option<PathBuf>,
    datasources: Option<Vec<DatasourceConfig>>,
    default_datasource: Option<String>,
    corruption_threshold: Option<u32>,
    corruption_no_cache_check: Option<bool>,
    steam_probe_url: Option<String>,
    steam_probe_domains: Option<Vec<String>>,
    #[serde(default)]
    prefill: PrefillFileSection,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    pub helper_bin_dir: Option<PathBuf>,
    pub datasources: Vec<DatasourceConfig>,
    pub default_datasource: Option<String>,
    pub corruption_threshold: u32,
    pub corruption_no_cache_check: bool,
    pub timezone: String,
    pub steam_probe_url: String,
    pub steam_probe_domains: Vec<String>,
    pub prefill: PrefillConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("/data"),
            helper_bin_dir: None,
            datasources: Vec::new(),
            default_datasource: None,
            corruption_threshold: 5,
            corruption_no_cache_check: false,
            timezone: std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string()),
            steam_probe_url: "https://steamcontent.com".to_string(),
            steam_probe_domains: vec![
                "steamcontent.com".to_string(),
                "steampowered.com".to_string(),
            ],
            prefill: PrefillConfig::default(),
        }
    }
}

impl Config {
    /// Loads and merges `path` onto the in-process defaults. A missing file
    /// is not an error at this layer — callers decide whether a fresh
    /// install with default-only config is acceptable.
    pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })?;
        Self::from_json(&contents, path)
    }

    fn from_json(contents: &str, path: &std::path::Path) -> Result<Config, ConfigError> {
        let file: ConfigFile = serde_json::from_str(contents)
            .map_err(|e| ConfigError::Parse { path: path.display().to_string(), source: e })?;
        Ok(Self::merge(file))
    }

    fn merge(file: ConfigFile) -> Config {
        let base = Config::default();
        Config {
            data_root: file.data_root.unwrap_or(base.data_root),
            helper_bin_dir: file.helper_bin_dir.or(base.helper_bin_dir),
            datasources: file.datasources.unwrap_or(base.datasources),
            default_datasource: file.default_datasource.or(base.default_datasource),
            corruption_threshold: file.corruption_threshold.unwrap_or(base.corruption_threshold),
            corruption_no_cache_check: file.corruption_no_cache_check.unwrap_or(base.corruption_no_cache_check),
            timezone: base.timezone,
            steam_probe_url: file.steam_probe_url.unwrap_or(base.steam_probe_url),
            steam_probe_domains: file.steam_probe_domains.unwrap_or(base.steam_probe_domains),
            prefill: file.prefill.merge_into(base.prefill),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
