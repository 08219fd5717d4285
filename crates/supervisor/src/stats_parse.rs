// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses the service-remover helper's human-readable stderr summary lines
//! into [`ServiceRemovalStats`] (spec §4.J). The helper reports its final
//! tallies as free-form lines ("Cache files deleted: N", "Bytes freed: X
//! GB|MB", "Log entries removed: N", "Database entries deleted: N") rather
//! than structured JSON, so the supervisor scrapes them the same way
//! log-tailing tools scrape free-form text: one regex per line shape.

use lancache_protocol::ServiceRemovalStats;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static CACHE_FILES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)cache files deleted:\s*(\d+)").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static BYTES_FREED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bytes freed:\s*([\d.]+)\s*(GB|MB|KB|B)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static LOG_ENTRIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)log entries removed:\s*(\d+)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static DB_ENTRIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)database entries deleted:\s*(\d+)").expect("constant regex pattern is valid")
});

fn unit_multiplier(unit: &str) -> f64 {
    match unit.to_ascii_uppercase().as_str() {
        "GB" => 1024.0 * 1024.0 * 1024.0,
        "MB" => 1024.0 * 1024.0,
        "KB" => 1024.0,
        _ => 1.0,
    }
}

/// Scans `stderr` line by line, accumulating every recognized statistics
/// line. Lines that don't match any known shape are ignored; the helper is
/// permitted to emit arbitrary diagnostic output there (spec §4.E).
pub fn parse_removal_stats(stderr: &str) -> ServiceRemovalStats {
    let mut stats = ServiceRemovalStats::default();
    for line in stderr.lines() {
        if let Some(caps) = CACHE_FILES.captures(line) {
            stats.cache_files_deleted += caps[1].parse().unwrap_or(0);
        }
        if let Some(caps) = BYTES_FREED.captures(line) {
            let value: f64 = caps[1].parse().unwrap_or(0.0);
            stats.bytes_freed += (value * unit_multiplier(&caps[2])) as u64;
        }
        if let Some(caps) = LOG_ENTRIES.captures(line) {
            stats.log_entries_removed += caps[1].parse().unwrap_or(0);
        }
        if let Some(caps) = DB_ENTRIES.captures(line) {
            stats.database_entries_deleted += caps[1].parse().unwrap_or(0);
        }
    }
    stats
}

#[cfg(test)]
#[path = "stats_parse_tests.rs"]
mod tests;
