// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native worker CLI contracts (spec §6): the progress files each helper
//! rewrites atomically while running, and the final output JSON some of them
//! produce. Field names match the helpers' actual JSON keys (mixed
//! snake_case/camelCase, per spec §6) — `#[serde(rename)]` bridges that to
//! idiomatic Rust field names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Anything with a `percent_complete` and `status`/`message`, so the
/// supervisor's poll loop can forward progress without matching on the
/// concrete worker kind.
pub trait WorkerProgress {
    fn percent_complete(&self) -> u8;
    fn status(&self) -> &str;
    fn message(&self) -> &str;
}

/// `log-manager count` progress (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogManagerProgress {
    pub is_processing: bool,
    pub percent_complete: u8,
    pub status: String,
    pub message: String,
    pub lines_processed: u64,
    pub service_counts: HashMap<String, u64>,
}

impl WorkerProgress for LogManagerProgress {
    fn percent_complete(&self) -> u8 {
        self.percent_complete
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn message(&self) -> &str {
        &self.message
    }
}

/// `corruption-manager summary`/`detect` progress (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorruptionProgress {
    pub status: String,
    pub message: String,
    #[serde(rename = "filesProcessed")]
    pub files_processed: u64,
    #[serde(rename = "totalFiles")]
    pub total_files: u64,
    #[serde(rename = "percentComplete")]
    pub percent_complete: u8,
    #[serde(rename = "currentFile")]
    pub current_file: Option<String>,
    pub timestamp: Option<String>,
}

impl WorkerProgress for CorruptionProgress {
    fn percent_complete(&self) -> u8 {
        self.percent_complete
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn message(&self) -> &str {
        &self.message
    }
}

/// `corruption-manager summary` stdout result (spec §6): final
/// service→corrupted-chunk-count tally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorruptionSummary {
    pub service_counts: HashMap<String, i64>,
    pub total_corrupted: i64,
}

/// One entry in `corruption-manager detect`'s output (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorruptionChunk {
    pub service: String,
    pub url: String,
    pub miss_count: u64,
    pub cache_file_path: String,
}

/// `corruption-manager detect` output JSON (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorruptionDetectOutput {
    pub corrupted_chunks: Vec<CorruptionChunk>,
    pub summary: CorruptionSummary,
}

/// `cache-cleaner`'s delete mode argument (spec §4.G, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    Preserve,
    Full,
    Rsync,
}

impl DeleteMode {
    pub fn as_cli_arg(&self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Full => "full",
            Self::Rsync => "rsync",
        }
    }
}

/// `cache-cleaner` progress (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheCleanerProgress {
    pub is_processing: bool,
    pub percent_complete: u8,
    pub status: String,
    pub message: String,
    pub directories_processed: u64,
    pub total_directories: u64,
    pub bytes_deleted: u64,
    pub files_deleted: u64,
    #[serde(default)]
    pub active_directories: Vec<String>,
    #[serde(default)]
    pub active_count: u32,
}

impl WorkerProgress for CacheCleanerProgress {
    fn percent_complete(&self) -> u8 {
        self.percent_complete
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn message(&self) -> &str {
        &self.message
    }
}

/// One detected game in `game-cache-detector`'s output (spec §6, mirrors
/// `CachedGameDetection` in spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameDetectorGame {
    pub game_app_id: i64,
    pub game_name: String,
    pub cache_files_found: i64,
    pub total_size_bytes: i64,
    #[serde(default)]
    pub depot_ids: Vec<i64>,
    #[serde(default)]
    pub sample_urls: Vec<String>,
    #[serde(default)]
    pub cache_file_paths: Vec<String>,
}

/// One detected service in `game-cache-detector`'s output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameDetectorService {
    pub service_name: String,
    pub cache_files_found: i64,
    pub total_size_bytes: i64,
    #[serde(default)]
    pub sample_urls: Vec<String>,
    #[serde(default)]
    pub cache_file_paths: Vec<String>,
}

/// `game-cache-detector` output JSON (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameDetectorOutput {
    pub total_games_detected: u64,
    pub total_services_detected: u64,
    #[serde(default)]
    pub games: Vec<GameDetectorGame>,
    #[serde(default)]
    pub services: Vec<GameDetectorService>,
}

/// Shared progress shape for `game-cache-remover` and `service-remover`
/// (spec §4.J: "poll the progress file, forward progress (percent, message,
/// filesProcessed)").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemovalProgress {
    pub percent_complete: u8,
    pub status: String,
    pub message: String,
    pub files_processed: u64,
}

impl WorkerProgress for RemovalProgress {
    fn percent_complete(&self) -> u8 {
        self.percent_complete
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn message(&self) -> &str {
        &self.message
    }
}

/// `game-cache-remover`'s output JSON (spec §6). `service-remover` produces
/// the same shape but reports its authoritative totals on stderr instead
/// (spec §4.J) — the supervisor prefers the stderr-parsed
/// [`crate::daemon`]-independent [`ServiceRemovalStats`] for that worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoverOutput {
    pub cache_files_deleted: u64,
    pub total_bytes_freed: u64,
    pub empty_dirs_removed: u64,
    pub log_entries_removed: u64,
    #[serde(default)]
    pub depot_ids: Vec<i64>,
}

/// Statistics the `service-remover` helper prints as human-readable stderr
/// lines (spec §4.J): "Cache files deleted: N", "Bytes freed: X GB|MB",
/// "Log entries removed: N", "Database entries deleted: N".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServiceRemovalStats {
    pub cache_files_deleted: u64,
    pub bytes_freed: u64,
    pub log_entries_removed: u64,
    pub database_entries_deleted: u64,
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
