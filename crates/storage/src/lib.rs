// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lancache-storage: the SQLite-backed persistence layer for the operation
//! plane's durable state (spec §3) — detection caches, the depot→app
//! mapping, downloads, prefill sessions/history, banned users, and the
//! crash-recovery operation state store (spec §4.C).
//!
//! The database is single-writer (spec §5); every store here is cheap to
//! clone (an `Arc`-backed `sqlx::SqlitePool` underneath) and safe to share
//! across tasks.

pub mod bans;
pub mod db;
pub mod depot_mapping;
pub mod detections;
pub mod downloads;
pub mod error;
pub mod log_position;
pub mod operation_state;
pub mod prefill;

pub use bans::{BanStore, BannedSteamUser};
pub use db::Db;
pub use depot_mapping::{DepotMappingStore, SteamDepotMapping};
pub use detections::{
    CachedCorruptionDetection, CachedGameDetection, CachedServiceDetection, DetectionStore,
};
pub use downloads::{Download, DownloadStore, BACKFILL_BATCH_SIZE, BACKFILL_LOOKBACK_HOURS};
pub use error::{Result, StorageError};
pub use log_position::{LogPosition, LogPositionStore};
pub use operation_state::{OperationStateRecord, OperationStateStore, DEFAULT_RUNNING_CUTOFF_SECS};
pub use prefill::{
    PrefillCachedDepot, PrefillHistoryEntry, PrefillHistoryStatus, PrefillSession,
    PrefillSessionStatus, PrefillStore,
};
