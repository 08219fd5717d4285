// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_all_four_statistics_lines() {
    let stderr = "Starting removal for service steam\n\
                  Cache files deleted: 120\n\
                  Bytes freed: 2.5 GB\n\
                  Log entries removed: 340\n\
                  Database entries deleted: 3\n\
                  Done.\n";
    let stats = parse_removal_stats(stderr);
    assert_eq!(stats.cache_files_deleted, 120);
    assert_eq!(stats.bytes_freed, (2.5 * 1024.0 * 1024.0 * 1024.0) as u64);
    assert_eq!(stats.log_entries_removed, 340);
    assert_eq!(stats.database_entries_deleted, 3);
}

#[test]
fn ignores_unrelated_diagnostic_lines() {
    let stderr = "some warning about permissions\nretrying...\n";
    let stats = parse_removal_stats(stderr);
    assert_eq!(stats, ServiceRemovalStats::default());
}

#[test]
fn sums_repeated_lines_across_multiple_datasources() {
    let stderr = "Cache files deleted: 10\nCache files deleted: 5\n";
    let stats = parse_removal_stats(stderr);
    assert_eq!(stats.cache_files_deleted, 15);
}

#[test]
fn bytes_freed_handles_mb_and_kb_units() {
    assert_eq!(parse_removal_stats("Bytes freed: 1 MB\n").bytes_freed, 1024 * 1024);
    assert_eq!(parse_removal_stats("Bytes freed: 1 KB\n").bytes_freed, 1024);
}
