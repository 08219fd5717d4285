// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Game/Service Removal (spec §4.J): per-datasource, writability-gated,
//! progress-polled removal of a single game or service from the cache, the
//! log, and the database.
//!
//! One active removal per logical entity (an app id or a lower-cased
//! service name) is enforced the same way cache clearing enforces
//! single-flight — by registering under an [`EntityKey`] the UOT already
//! dedups on, scoped by [`OperationType`] so a game removal and a service
//! removal never collide (spec §4.F, §4.J).

use crate::corruption_detection::CorruptionDetectionService;
use crate::error::{EngineError, Result};
use crate::notify::NotificationBus;
use crate::pause_gate::PauseGate;
use crate::uot::{schedule_eviction, UnifiedOperationTracker};
use async_trait::async_trait;
use lancache_core::operation::{OperationId, OperationMetadata, OperationType};
use lancache_core::{Clock, CoreError, Datasource, NotificationEvent, NotificationPayload, SystemClock};
use lancache_protocol::{RemovalProgress, RemoverOutput, ServiceRemovalStats};
use lancache_storage::DetectionStore;
use lancache_supervisor::{parse_removal_stats, poll_progress, NativeWorkerSupervisor, DEFAULT_POLL_INTERVAL};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Signals the upstream reverse proxy to reopen its log file handles after a
/// removal flow mutates the log on disk (spec §4.J: "so the upstream proxy
/// does not lose a file handle after log mutation"). An external
/// collaborator per spec §6 — specified here only as the interface the
/// removal flow calls into.
#[async_trait]
pub trait LogReopenSignal: Send + Sync {
    async fn reopen_log_files(&self);
}

/// A no-op implementation for deployments with nothing to signal (tests, or
/// a proxy that watches the log file by inode rather than handle).
pub struct NoopLogReopenSignal;

#[async_trait]
impl LogReopenSignal for NoopLogReopenSignal {
    async fn reopen_log_files(&self) {}
}

/// What a removal targets, and thereby which helper binary and
/// per-datasource gating rule applies (spec §4.J).
#[derive(Debug, Clone)]
enum Target {
    Game(i64),
    Service(String),
}

impl Target {
    fn entity_key(&self) -> String {
        match self {
            Self::Game(app_id) => app_id.to_string(),
            Self::Service(name) => name.to_ascii_lowercase(),
        }
    }

    fn cli_arg(&self) -> String {
        self.entity_key()
    }

    /// Service removal also requires a writable log directory per
    /// datasource; game removal only touches the cache (spec §4.J).
    fn requires_writable_logs(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

/// Aggregate result of a (possibly multi-datasource) game removal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GameRemovalResult {
    pub cache_files_deleted: u64,
    pub total_bytes_freed: u64,
    pub empty_dirs_removed: u64,
    pub log_entries_removed: u64,
    pub depot_ids: Vec<i64>,
    pub datasources_processed: Vec<String>,
    pub datasources_skipped: Vec<String>,
}

/// Aggregate result of a (possibly multi-datasource) service removal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceRemovalResult {
    pub cache_files_deleted: u64,
    pub total_bytes_freed: u64,
    pub log_entries_removed: u64,
    pub database_entries_deleted: u64,
    pub datasources_processed: Vec<String>,
    pub datasources_skipped: Vec<String>,
}

#[derive(Clone)]
pub struct RemovalService<C: Clock = SystemClock> {
    tracker: Arc<UnifiedOperationTracker<C>>,
    supervisor: Arc<NativeWorkerSupervisor>,
    bus: Arc<NotificationBus>,
    detections: Arc<DetectionStore>,
    pause_gate: Arc<PauseGate>,
    log_reopen: Arc<dyn LogReopenSignal>,
    corruption_detection: Arc<CorruptionDetectionService<C>>,
    game_remover_bin: PathBuf,
    service_remover_bin: PathBuf,
    db_path: PathBuf,
    operations_dir: PathBuf,
}

impl<C: Clock + Send + Sync + 'static> RemovalService<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<UnifiedOperationTracker<C>>,
        supervisor: Arc<NativeWorkerSupervisor>,
        bus: Arc<NotificationBus>,
        detections: Arc<DetectionStore>,
        pause_gate: Arc<PauseGate>,
        log_reopen: Arc<dyn LogReopenSignal>,
        corruption_detection: Arc<CorruptionDetectionService<C>>,
        game_remover_bin: PathBuf,
        service_remover_bin: PathBuf,
        db_path: PathBuf,
        operations_dir: PathBuf,
    ) -> Self {
        Self {
            tracker,
            supervisor,
            bus,
            detections,
            pause_gate,
            log_reopen,
            corruption_detection,
            game_remover_bin,
            service_remover_bin,
            db_path,
            operations_dir,
        }
    }

    pub async fn start_game_removal(
        &self,
        game_app_id: i64,
        datasources: Vec<Datasource>,
    ) -> Result<OperationId> {
        self.start(Target::Game(game_app_id), datasources).await
    }

    pub async fn start_service_removal(
        &self,
        service_name: &str,
        datasources: Vec<Datasource>,
    ) -> Result<OperationId> {
        self.start(Target::Service(service_name.to_string()), datasources).await
    }

    async fn start(&self, target: Target, datasources: Vec<Datasource>) -> Result<OperationId> {
        let (operation_type, name): (OperationType, &str) = match &target {
            Target::Game(_) => (OperationType::GameRemoval, "Game removal"),
            Target::Service(_) => (OperationType::ServiceRemoval, "Service removal"),
        };

        let candidates: Vec<Datasource> = datasources.into_iter().filter(|d| d.enabled).collect();
        let writable: Vec<Datasource> = candidates
            .iter()
            .filter(|d| d.cache_writable && (!target.requires_writable_logs() || d.logs_writable))
            .cloned()
            .collect();
        let skipped: Vec<String> = candidates
            .iter()
            .filter(|d| !(d.cache_writable && (!target.requires_writable_logs() || d.logs_writable)))
            .map(|d| d.name.clone())
            .collect();
        if !skipped.is_empty() {
            warn!(skipped = ?skipped, "skipping non-writable datasources for removal");
        }
        if writable.is_empty() {
            return Err(EngineError::Core(CoreError::PermissionDenied(
                "no writable datasources remain for this removal".into(),
            )));
        }

        let cancel = CancellationToken::new();
        let mut metadata = OperationMetadata::empty();
        metadata.set("entity_key", target.entity_key());
        let id = self.tracker.register(operation_type, name, cancel.clone(), metadata)?;
        match &target {
            Target::Game(_) => self.bus.notify_all(NotificationEvent::GameRemovalStarted { operation_id: id }),
            Target::Service(_) => self.bus.notify_all(NotificationEvent::ServiceRemovalStarted { operation_id: id }),
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.run(id, target, writable, skipped, cancel).await;
        });
        Ok(id)
    }

    fn fail(&self, id: OperationId, message: impl Into<String>) {
        self.tracker.complete(id, false, Some(message.into()));
        schedule_eviction(self.tracker.clone(), id);
    }

    async fn run(
        &self,
        id: OperationId,
        target: Target,
        datasources: Vec<Datasource>,
        skipped: Vec<String>,
        cancel: CancellationToken,
    ) {
        let n = datasources.len();
        let binary = match &target {
            Target::Game(_) => &self.game_remover_bin,
            Target::Service(_) => &self.service_remover_bin,
        };
        let binary_name = match &target {
            Target::Game(_) => "game-cache-remover",
            Target::Service(_) => "service-remover",
        };

        // Hold the pause gate for the full removal: the log monitor must not
        // tail a log file these helpers are mutating (spec §4.J, §4.K).
        let _pause = self.pause_gate.acquire();

        let mut game_total = GameRemovalResult { datasources_skipped: skipped.clone(), ..Default::default() };
        let mut service_total = ServiceRemovalResult { datasources_skipped: skipped, ..Default::default() };

        for (idx, ds) in datasources.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.fail(id, "cancelled");
            }
            if let Err(e) = self.supervisor.validate_binary_exists(binary, binary_name) {
                return self.fail(id, e.to_string());
            }

            let output_path = self.operations_dir.join(format!("{id}.{idx}.remove.json"));
            let progress_path = self.operations_dir.join(format!("{id}.{idx}.remove-progress.json"));
            let args = vec![
                self.db_path.display().to_string(),
                ds.log_path.display().to_string(),
                ds.cache_path.display().to_string(),
                target.cli_arg(),
                output_path.display().to_string(),
                progress_path.display().to_string(),
            ];

            let (child, handle) = match self.supervisor.spawn(binary, &args, None, &Default::default()) {
                Ok(v) => v,
                Err(e) => return self.fail(id, e.to_string()),
            };
            self.tracker.attach_worker_process(id, handle.clone());

            let tracker = self.tracker.clone();
            let bus = self.bus.clone();
            let is_game = matches!(&target, Target::Game(_));
            let poll_cancel = cancel.clone();
            let poll_path = progress_path.clone();
            let poll_task = tokio::spawn(async move {
                poll_progress::<RemovalProgress, _>(&poll_path, DEFAULT_POLL_INTERVAL, &poll_cancel, |p| {
                    let overall_pct =
                        (((idx as f64) + f64::from(p.percent_complete) / 100.0) / n as f64 * 100.0) as u8;
                    tracker.update_progress(id, overall_pct, p.message.clone());
                    let event = if is_game {
                        NotificationEvent::GameRemovalProgress {
                            operation_id: id,
                            percent_complete: overall_pct,
                            message: p.message.clone(),
                        }
                    } else {
                        NotificationEvent::ServiceRemovalProgress {
                            operation_id: id,
                            percent_complete: overall_pct,
                            message: p.message.clone(),
                        }
                    };
                    bus.notify_all(event);
                })
                .await;
            });

            let result = self.supervisor.execute_process(child, &handle, &cancel).await;
            poll_task.abort();

            let exec = match result {
                Ok(r) => r,
                Err(e) => return self.fail(id, e.to_string()),
            };
            if exec.was_cancelled() {
                let _ = tokio::fs::remove_file(&output_path).await;
                let _ = tokio::fs::remove_file(&progress_path).await;
                return self.fail(id, "cancelled");
            }
            if exec.exit_code != 0 {
                let err = CoreError::WorkerFailed { exit_code: exec.exit_code, message: exec.stderr_tail(2000) };
                return self.fail(id, err.to_string());
            }

            match &target {
                Target::Game(_) => match tokio::fs::read(&output_path).await {
                    Ok(bytes) => match serde_json::from_slice::<RemoverOutput>(&bytes) {
                        Ok(out) => {
                            game_total.cache_files_deleted += out.cache_files_deleted;
                            game_total.total_bytes_freed += out.total_bytes_freed;
                            game_total.empty_dirs_removed += out.empty_dirs_removed;
                            game_total.log_entries_removed += out.log_entries_removed;
                            for depot in out.depot_ids {
                                if !game_total.depot_ids.contains(&depot) {
                                    game_total.depot_ids.push(depot);
                                }
                            }
                            game_total.datasources_processed.push(ds.name.clone());
                        }
                        Err(e) => return self.fail(id, format!("parsing remover output: {e}")),
                    },
                    Err(e) => return self.fail(id, format!("reading remover output: {e}")),
                },
                Target::Service(_) => {
                    let stats: ServiceRemovalStats = parse_removal_stats(&String::from_utf8_lossy(&exec.stderr));
                    service_total.cache_files_deleted += stats.cache_files_deleted;
                    service_total.total_bytes_freed += stats.bytes_freed;
                    service_total.log_entries_removed += stats.log_entries_removed;
                    service_total.database_entries_deleted += stats.database_entries_deleted;
                    service_total.datasources_processed.push(ds.name.clone());
                }
            }

            self.supervisor.delete_temporary_file(&output_path).await;
            self.supervisor.delete_temporary_file(&progress_path).await;
        }

        // Post-removal (spec §4.J): drop the cached detection row so a
        // subsequent scan doesn't resurrect it, and let the upstream proxy
        // reopen its log file handles now that mutation is done.
        let delete_result = match &target {
            Target::Game(app_id) => self.detections.delete_game(*app_id).await,
            Target::Service(name) => {
                self.corruption_detection.mark_recently_removed(name);
                self.detections.delete_service(name).await
            }
        };
        if let Err(e) = delete_result {
            warn!(operation_id = %id, error = %e, "failed to invalidate cached detection row after removal");
        }
        self.log_reopen.reopen_log_files().await;

        info!(operation_id = %id, "removal complete");
        self.tracker.complete(id, true, None);
        schedule_eviction(self.tracker.clone(), id);

        match target {
            Target::Game(_) => self.bus.notify_all(NotificationEvent::GameRemovalComplete {
                operation_id: id,
                payload: NotificationPayload::from_value(
                    serde_json::to_value(&game_total).unwrap_or(serde_json::Value::Null),
                ),
            }),
            Target::Service(_) => self.bus.notify_all(NotificationEvent::ServiceRemovalComplete {
                operation_id: id,
                payload: NotificationPayload::from_value(
                    serde_json::to_value(&service_total).unwrap_or(serde_json::Value::Null),
                ),
            }),
        }
    }
}

#[cfg(test)]
#[path = "removal_tests.rs"]
mod tests;
