// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Depot Mapping Backfill (spec §4.L): periodically resolves downloads that
//! recorded a Steam depot id but no game identity yet, using previously
//! discovered owner mappings.

use crate::error::Result;
use crate::notify::NotificationBus;
use async_trait::async_trait;
use lancache_core::NotificationEvent;
use lancache_storage::{DepotMappingStore, DownloadStore, BACKFILL_BATCH_SIZE};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Base run cadence (spec §4.L: "≈30 s").
pub const BASE_INTERVAL: Duration = Duration::from_secs(30);
/// Slowed cadence once the backfill has seen nothing to do for a while
/// (spec §4.L: "after 5 consecutive empty runs, slow to ≈5 min").
pub const SLOW_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Consecutive empty runs before slowing down.
const EMPTY_RUNS_BEFORE_SLOWDOWN: u32 = 5;

/// A best-effort, potentially live, source of display metadata for a Steam
/// app — "preferring a live storefront lookup through the metadata
/// collaborator" (spec §4.L). An external collaborator per spec §6; the
/// fallback chain (mapping `AppName`, then a synthesized name) applies
/// whenever this returns `None`.
#[async_trait]
pub trait GameMetadataLookup: Send + Sync {
    async fn lookup(&self, app_id: i64) -> Option<GameMetadata>;
}

#[derive(Debug, Clone, Default)]
pub struct GameMetadata {
    pub name: Option<String>,
    pub image_url: Option<String>,
}

/// No live storefront access configured; every resolution falls back to the
/// mapping's own `AppName` or a synthesized name.
pub struct NoopGameMetadataLookup;

#[async_trait]
impl GameMetadataLookup for NoopGameMetadataLookup {
    async fn lookup(&self, _app_id: i64) -> Option<GameMetadata> {
        None
    }
}

pub struct DepotMappingBackfill {
    downloads: Arc<DownloadStore>,
    depot_mappings: Arc<DepotMappingStore>,
    bus: Arc<NotificationBus>,
    metadata: Arc<dyn GameMetadataLookup>,
    consecutive_empty_runs: AtomicU32,
}

impl DepotMappingBackfill {
    pub fn new(
        downloads: Arc<DownloadStore>,
        depot_mappings: Arc<DepotMappingStore>,
        bus: Arc<NotificationBus>,
        metadata: Arc<dyn GameMetadataLookup>,
    ) -> Self {
        Self { downloads, depot_mappings, bus, metadata, consecutive_empty_runs: AtomicU32::new(0) }
    }

    /// The cadence the next run should wait for, given how many consecutive
    /// runs in a row found nothing to resolve (spec §4.L).
    pub fn next_interval(&self) -> Duration {
        if self.consecutive_empty_runs.load(Ordering::Relaxed) >= EMPTY_RUNS_BEFORE_SLOWDOWN {
            SLOW_INTERVAL
        } else {
            BASE_INTERVAL
        }
    }

    /// Runs one backfill pass: resolves as many unresolved Steam downloads
    /// as it can from already-discovered owner mappings, attaches the
    /// results in one transaction, and emits `DownloadsRefresh` if anything
    /// changed. Returns the number of downloads resolved.
    pub async fn run_once(&self) -> Result<usize> {
        let unresolved = self.downloads.unresolved_steam_downloads(BACKFILL_BATCH_SIZE).await?;
        if unresolved.is_empty() {
            self.consecutive_empty_runs.fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        }

        let depot_ids: Vec<i64> = unresolved.iter().filter_map(|d| d.depot_id).collect();
        let owners = self.depot_mappings.owners_for_depots(&depot_ids).await?;

        let mut resolutions = Vec::new();
        for download in &unresolved {
            let Some(depot_id) = download.depot_id else { continue };
            let Some(owner) = owners.get(&depot_id) else { continue };

            let metadata = self.metadata.lookup(owner.app_id).await;
            let name = metadata
                .as_ref()
                .and_then(|m| m.name.clone())
                .or_else(|| owner.app_name.clone())
                .unwrap_or_else(|| format!("Steam App {}", owner.app_id));
            let image_url = metadata.and_then(|m| m.image_url);

            resolutions.push((download.id.clone(), owner.app_id, Some(name), image_url));
        }

        if resolutions.is_empty() {
            self.consecutive_empty_runs.fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        }

        let resolved = resolutions.len();
        self.downloads.attach_game_identity(&resolutions).await?;
        self.consecutive_empty_runs.store(0, Ordering::Relaxed);
        info!(resolved, "depot mapping backfill resolved downloads");
        self.bus.notify_all(NotificationEvent::DownloadsRefresh);
        Ok(resolved)
    }
}

/// Spawns the adaptive backfill loop; runs until `cancel` fires.
pub fn spawn_backfill_loop(backfill: Arc<DepotMappingBackfill>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            let interval = backfill.next_interval();
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = backfill.run_once().await {
                        warn!(error = %e, "depot mapping backfill pass failed");
                    } else {
                        debug!(next_interval = ?backfill.next_interval(), "depot mapping backfill pass complete");
                    }
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "depot_backfill_tests.rs"]
mod tests;
