// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache Clearing Service (spec §4.G): sequential, multi-datasource
//! orchestration of the `cache-cleaner` helper with aggregate progress.
//!
//! Only one cache-clear may run at a time process-wide; this is enforced
//! structurally by registering every clear under the same fixed
//! [`EntityKey`] regardless of target, so the UOT's `AlreadyInProgress`
//! check does the single-flighting for us (spec §4.G, §9).

use crate::error::{EngineError, Result};
use crate::notify::NotificationBus;
use crate::uot::{schedule_eviction, UnifiedOperationTracker};
use lancache_core::operation::{EntityKey, OperationId, OperationMetadata, OperationType};
use lancache_core::{Clock, CoreError, Datasource, NotificationEvent, NotificationPayload, SystemClock};
use lancache_protocol::{CacheCleanerProgress, DeleteMode};
use lancache_storage::{OperationStateRecord, OperationStateStore};
use lancache_supervisor::{poll_progress, read_progress_file, NativeWorkerSupervisor, DEFAULT_POLL_INTERVAL};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fixed entity key every cache-clear operation registers under, regardless
/// of target datasource (spec §4.G: "single-flight via a mutex guarding
/// startup; UOT enforces it structurally").
pub const ENTITY_KEY: &str = "cache_clear";

/// "Save intermediate state every ~10 bucket completions" (spec §4.G).
const STATE_SAVE_BUCKET_INTERVAL: u64 = 10;

/// Aggregate result of a (possibly multi-datasource) cache clear.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheClearResult {
    pub directories_processed: u64,
    pub files_deleted: u64,
    pub bytes_deleted: u64,
    pub datasources_cleared: Vec<String>,
    pub datasources_skipped: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct CacheClearingService<C: Clock = SystemClock> {
    tracker: Arc<UnifiedOperationTracker<C>>,
    supervisor: Arc<NativeWorkerSupervisor>,
    bus: Arc<NotificationBus>,
    state: Arc<OperationStateStore>,
    cleaner_bin: PathBuf,
    operations_dir: PathBuf,
}

impl<C: Clock + Send + Sync + 'static> CacheClearingService<C> {
    pub fn new(
        tracker: Arc<UnifiedOperationTracker<C>>,
        supervisor: Arc<NativeWorkerSupervisor>,
        bus: Arc<NotificationBus>,
        state: Arc<OperationStateStore>,
        cleaner_bin: PathBuf,
        operations_dir: PathBuf,
    ) -> Self {
        Self { tracker, supervisor, bus, state, cleaner_bin, operations_dir }
    }

    /// Starts a cache clear against `target` (a specific datasource name) or
    /// every configured datasource when `target` is `None` (spec §4.G).
    /// Validates the delete mode and the writable-target set synchronously,
    /// then spawns the sequential per-datasource run.
    pub async fn start_clear(
        &self,
        datasources: Vec<Datasource>,
        target: Option<&str>,
        delete_mode: DeleteMode,
    ) -> Result<OperationId> {
        if delete_mode == DeleteMode::Rsync && !rsync_available() {
            return Err(EngineError::Core(CoreError::Config(
                "rsync delete mode requested but the rsync tool is unavailable on this platform".into(),
            )));
        }

        let selected: Vec<Datasource> = match target {
            Some(name) => datasources.into_iter().filter(|d| d.name == name).collect(),
            None => datasources,
        };
        if selected.is_empty() {
            return Err(EngineError::Core(CoreError::NotFound("no matching datasource".into())));
        }

        let existing: Vec<Datasource> = selected.into_iter().filter(|d| d.cache_path.exists()).collect();
        let writable: Vec<Datasource> = existing.iter().filter(|d| d.cache_writable).cloned().collect();
        let skipped: Vec<String> =
            existing.iter().filter(|d| !d.cache_writable).map(|d| d.name.clone()).collect();

        if !skipped.is_empty() {
            warn!(skipped = ?skipped, "skipping read-only datasources for cache clear");
        }
        if writable.is_empty() {
            return Err(EngineError::Core(CoreError::PermissionDenied(
                "no writable cache datasources remain (all candidates are read-only)".into(),
            )));
        }

        let cancel = CancellationToken::new();
        let mut metadata = OperationMetadata::empty();
        metadata.set("entity_key", ENTITY_KEY);
        let id = self.tracker.register(
            OperationType::CacheClearing,
            "Cache clear",
            cancel.clone(),
            metadata,
        )?;
        self.bus.notify_all(NotificationEvent::CacheClearingStarted { operation_id: id });

        let this = self.clone();
        tokio::spawn(async move {
            this.run(id, writable, skipped, delete_mode, cancel).await;
        });
        Ok(id)
    }

    async fn run(
        &self,
        id: OperationId,
        writable: Vec<Datasource>,
        skipped: Vec<String>,
        delete_mode: DeleteMode,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();
        let n = writable.len();
        let mut total = CacheClearResult { datasources_skipped: skipped, ..Default::default() };

        for (idx, ds) in writable.iter().enumerate() {
            if cancel.is_cancelled() {
                self.tracker.complete(id, false, None);
                schedule_eviction(self.tracker.clone(), id);
                return;
            }

            let bucket_count = count_hex_buckets(&ds.cache_path).await;
            info!(datasource = %ds.name, buckets = bucket_count, "starting cache clear");

            let progress_path = self.operations_dir.join(format!("{id}.cache-clean.json"));
            if let Err(e) = self.supervisor.validate_binary_exists(&self.cleaner_bin, "cache-cleaner") {
                self.tracker.complete(id, false, Some(e.to_string()));
                schedule_eviction(self.tracker.clone(), id);
                return;
            }

            let args = vec![
                ds.cache_path.display().to_string(),
                progress_path.display().to_string(),
                delete_mode.as_cli_arg().to_string(),
            ];
            let (child, handle) = match self.supervisor.spawn(&self.cleaner_bin, &args, None, &Default::default()) {
                Ok(v) => v,
                Err(e) => {
                    self.tracker.complete(id, false, Some(e.to_string()));
                    schedule_eviction(self.tracker.clone(), id);
                    return;
                }
            };
            self.tracker.attach_worker_process(id, handle.clone());

            let base = total.clone();
            let ds_name = ds.name.clone();
            let tracker = self.tracker.clone();
            let bus = self.bus.clone();
            let state = self.state.clone();
            let poll_cancel = cancel.clone();
            let poll_progress_path = progress_path.clone();
            let poll_task = tokio::spawn(async move {
                let mut last_saved = 0u64;
                poll_progress::<CacheCleanerProgress, _>(
                    &poll_progress_path,
                    DEFAULT_POLL_INTERVAL,
                    &poll_cancel,
                    |p| {
                        let overall_pct = (((idx as f64) + f64::from(p.percent_complete) / 100.0)
                            / n as f64
                            * 100.0) as u8;
                        tracker.update_progress(id, overall_pct, p.message.clone());
                        bus.notify_all(NotificationEvent::CacheClearingProgress {
                            operation_id: id,
                            percent_complete: overall_pct,
                            message: p.message.clone(),
                        });
                        if p.directories_processed.saturating_sub(last_saved) >= STATE_SAVE_BUCKET_INTERVAL {
                            last_saved = p.directories_processed;
                            let record = OperationStateRecord {
                                key: OperationStateStore::key_for("CacheClearing", &id.to_string()),
                                r#type: "CacheClearing".to_string(),
                                status: "Running".to_string(),
                                message: format!("{ds_name}: {} buckets", p.directories_processed),
                                data_blob: serde_json::json!({
                                    "directories_processed": base.directories_processed + p.directories_processed,
                                    "files_deleted": base.files_deleted + p.files_deleted,
                                    "bytes_deleted": base.bytes_deleted + p.bytes_deleted,
                                }),
                                created_at: chrono::Utc::now(),
                            };
                            let state = state.clone();
                            tokio::spawn(async move {
                                let _ = state.save_state(&record).await;
                            });
                        }
                    },
                )
                .await;
            });

            let result = self.supervisor.execute_process(child, &handle, &cancel).await;
            poll_task.abort();

            match result {
                Ok(r) if r.was_cancelled() => {
                    self.tracker.complete(id, false, None);
                    schedule_eviction(self.tracker.clone(), id);
                    return;
                }
                Ok(r) if r.exit_code != 0 => {
                    let err = CoreError::WorkerFailed {
                        exit_code: r.exit_code,
                        message: r.stderr_tail(2000),
                    };
                    self.tracker.complete(id, false, Some(err.to_string()));
                    schedule_eviction(self.tracker.clone(), id);
                    return;
                }
                Ok(_) => {
                    if let Some(p) = read_progress_file::<CacheCleanerProgress>(&progress_path).await {
                        total.directories_processed += p.directories_processed;
                        total.files_deleted += p.files_deleted;
                        total.bytes_deleted += p.bytes_deleted;
                    }
                    total.datasources_cleared.push(ds.name.clone());
                }
                Err(e) => {
                    self.tracker.complete(id, false, Some(e.to_string()));
                    schedule_eviction(self.tracker.clone(), id);
                    return;
                }
            }
            self.supervisor.delete_temporary_file(&progress_path).await;
        }

        total.duration_ms = started.elapsed().as_millis() as u64;
        self.tracker.complete(id, true, None);
        schedule_eviction(self.tracker.clone(), id);
        self.bus.notify_all(NotificationEvent::CacheClearingComplete {
            operation_id: id,
            payload: NotificationPayload::from_value(
                serde_json::to_value(&total).unwrap_or(serde_json::Value::Null),
            ),
        });
    }
}

/// Enumerates "bucket" subdirectories whose names are exactly two hex
/// characters (spec §4.G: "the unit of parallelism for the cache cleaner").
async fn count_hex_buckets(cache_path: &Path) -> u64 {
    let mut count = 0u64;
    let Ok(mut entries) = tokio::fs::read_dir(cache_path).await else {
        return 0;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            count += 1;
        }
    }
    count
}

/// Whether the `rsync` binary is reachable on `PATH` (spec §4.G: "rejected
/// if the platform lacks the rsync tool or is not POSIX").
fn rsync_available() -> bool {
    if !cfg!(unix) {
        return false;
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join("rsync").is_file())
        })
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "cache_clearing_tests.rs"]
mod tests;
