// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Game Cache Detection Service (spec §4.I): full and incremental scans
//! across datasources with cross-datasource dedup/merge and a post-scan
//! pass that resolves "Unknown Game (Depot N)" placeholders against
//! discovered depot owner mappings.

use crate::error::{EngineError, Result};
use crate::notify::NotificationBus;
use crate::uot::{schedule_eviction, UnifiedOperationTracker};
use lancache_core::operation::{OperationId, OperationMetadata, OperationType};
use lancache_core::{Clock, CoreError, Datasource, NotificationEvent, NotificationPayload, SystemClock};
use lancache_protocol::{GameDetectorGame, GameDetectorOutput, GameDetectorService};
use lancache_storage::{
    CachedGameDetection, CachedServiceDetection, DepotMappingStore, DetectionStore,
    OperationStateRecord, OperationStateStore,
};
use lancache_supervisor::NativeWorkerSupervisor;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const ENTITY_KEY: &str = "game_cache_detection";

/// Minimum unresolved placeholders, and at least one now-resolvable among
/// them, before an incremental scan invalidates the whole table and
/// upgrades itself to a full scan (spec §4.I).
const INVALIDATION_MIN_UNKNOWNS: usize = 3;

const MAX_SAMPLE_URLS: usize = 5;

#[derive(Clone)]
pub struct GameCacheDetectionService<C: Clock = SystemClock> {
    tracker: Arc<UnifiedOperationTracker<C>>,
    supervisor: Arc<NativeWorkerSupervisor>,
    bus: Arc<NotificationBus>,
    detections: Arc<DetectionStore>,
    depot_mappings: Arc<DepotMappingStore>,
    state: Arc<OperationStateStore>,
    detector_bin: PathBuf,
    db_path: PathBuf,
    operations_dir: PathBuf,
}

impl<C: Clock + Send + Sync + 'static> GameCacheDetectionService<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<UnifiedOperationTracker<C>>,
        supervisor: Arc<NativeWorkerSupervisor>,
        bus: Arc<NotificationBus>,
        detections: Arc<DetectionStore>,
        depot_mappings: Arc<DepotMappingStore>,
        state: Arc<OperationStateStore>,
        detector_bin: PathBuf,
        db_path: PathBuf,
        operations_dir: PathBuf,
    ) -> Self {
        Self {
            tracker,
            supervisor,
            bus,
            detections,
            depot_mappings,
            state,
            detector_bin,
            db_path,
            operations_dir,
        }
    }

    pub async fn start_scan(&self, datasources: Vec<Datasource>, incremental: bool) -> Result<OperationId> {
        let usable: Vec<Datasource> = datasources.into_iter().filter(|d| d.enabled).collect();
        if usable.is_empty() {
            return Err(EngineError::Core(CoreError::NotFound("no enabled datasources".into())));
        }

        let cancel = CancellationToken::new();
        let mut metadata = OperationMetadata::empty();
        metadata.set("entity_key", ENTITY_KEY);
        let id = self.tracker.register(
            OperationType::GameDetection,
            "Game cache detection",
            cancel.clone(),
            metadata,
        )?;
        self.bus.notify_all(NotificationEvent::GameDetectionStarted { operation_id: id });

        let this = self.clone();
        tokio::spawn(async move {
            this.run(id, usable, incremental, cancel).await;
        });
        Ok(id)
    }

    fn progress(&self, id: OperationId, percent: u8, message: impl Into<String>) {
        let message = message.into();
        self.tracker.update_progress(id, percent, message.clone());
        self.bus.notify_all(NotificationEvent::GameDetectionProgress {
            operation_id: id,
            percent_complete: percent,
            message,
        });
    }

    fn fail(&self, id: OperationId, message: impl Into<String>) {
        self.tracker.complete(id, false, Some(message.into()));
        schedule_eviction(self.tracker.clone(), id);
    }

    async fn run(&self, id: OperationId, datasources: Vec<Datasource>, incremental: bool, cancel: CancellationToken) {
        self.progress(id, 0, "Preparing scan");

        let mut incremental = incremental;
        let existing = match self.detections.all_games().await {
            Ok(g) => g,
            Err(e) => return self.fail(id, e.to_string()),
        };

        if incremental {
            let unknowns: Vec<&CachedGameDetection> = existing.iter().filter(|g| g.is_unknown()).collect();
            let mut any_resolvable = false;
            if unknowns.len() >= INVALIDATION_MIN_UNKNOWNS {
                for g in &unknowns {
                    for depot_id in &g.depot_ids {
                        if matches!(self.depot_mappings.owner_for_depot(*depot_id).await, Ok(Some(_))) {
                            any_resolvable = true;
                            break;
                        }
                    }
                    if any_resolvable {
                        break;
                    }
                }
            }
            if any_resolvable {
                info!(operation_id = %id, "invalidating cached game detections, upgrading to full scan");
                if let Err(e) = self.detections.replace_all_games(&[]).await {
                    return self.fail(id, e.to_string());
                }
                incremental = false;
            }
        }
        self.progress(id, 5, "Prepared");

        if cancel.is_cancelled() {
            return self.fail(id, "cancelled");
        }

        // Pre-scan: known app ids are written to an exclusion file so the
        // detector skips what it's already told us about (spec §4.I). The
        // set is re-read rather than reusing `existing` since invalidation
        // above may have just emptied the table.
        let exclusion_path = self.operations_dir.join(format!("{id}.exclusions.json"));
        if incremental {
            let known: Vec<i64> = match self.detections.all_games().await {
                Ok(g) => g.into_iter().map(|g| g.game_app_id).collect(),
                Err(e) => return self.fail(id, e.to_string()),
            };
            match serde_json::to_vec(&known) {
                Ok(bytes) => {
                    if tokio::fs::write(&exclusion_path, bytes).await.is_err() {
                        warn!(operation_id = %id, "failed to write exclusion file, proceeding unfiltered");
                    }
                }
                Err(_) => warn!(operation_id = %id, "failed to serialize exclusion file"),
            }
        }
        self.progress(id, 30, "Pre-scan complete");

        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&exclusion_path).await;
            return self.fail(id, "cancelled");
        }

        let n = datasources.len();
        let mut games: HashMap<i64, CachedGameDetection> = HashMap::new();
        let mut services: HashMap<String, CachedServiceDetection> = HashMap::new();
        let now = chrono::Utc::now();

        for (idx, ds) in datasources.iter().enumerate() {
            if cancel.is_cancelled() {
                let _ = tokio::fs::remove_file(&exclusion_path).await;
                return self.fail(id, "cancelled");
            }
            if let Err(e) = self.supervisor.validate_binary_exists(&self.detector_bin, "game-cache-detector") {
                let _ = tokio::fs::remove_file(&exclusion_path).await;
                return self.fail(id, e.to_string());
            }

            let output_path = self.operations_dir.join(format!("{id}.{idx}.detect.json"));
            let mut args = vec![
                self.db_path.display().to_string(),
                ds.cache_path.display().to_string(),
                output_path.display().to_string(),
            ];
            if incremental {
                args.push(exclusion_path.display().to_string());
                args.push("--incremental".to_string());
            }

            let (child, handle) = match self.supervisor.spawn(&self.detector_bin, &args, None, &Default::default()) {
                Ok(v) => v,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&exclusion_path).await;
                    return self.fail(id, e.to_string());
                }
            };
            self.tracker.attach_worker_process(id, handle.clone());

            let result = self.supervisor.execute_process(child, &handle, &cancel).await;
            match result {
                Ok(r) if r.was_cancelled() => {
                    let _ = tokio::fs::remove_file(&exclusion_path).await;
                    let _ = tokio::fs::remove_file(&output_path).await;
                    return self.fail(id, "cancelled");
                }
                Ok(r) if r.exit_code != 0 => {
                    let err = CoreError::WorkerFailed { exit_code: r.exit_code, message: r.stderr_tail(2000) };
                    let _ = tokio::fs::remove_file(&exclusion_path).await;
                    return self.fail(id, err.to_string());
                }
                Ok(_) => {
                    let bytes = match tokio::fs::read(&output_path).await {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tokio::fs::remove_file(&exclusion_path).await;
                            return self.fail(id, format!("reading detector output: {e}"));
                        }
                    };
                    let output: GameDetectorOutput = match serde_json::from_slice(&bytes) {
                        Ok(v) => v,
                        Err(e) => {
                            let _ = tokio::fs::remove_file(&exclusion_path).await;
                            return self.fail(id, format!("parsing detector output: {e}"));
                        }
                    };
                    merge_games(&mut games, output.games, &ds.name, now);
                    merge_services(&mut services, output.services, &ds.name, now);
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&exclusion_path).await;
                    return self.fail(id, e.to_string());
                }
            }
            let _ = tokio::fs::remove_file(&output_path).await;

            let pct = 30 + (((idx + 1) as f64 / n as f64) * 40.0) as u8;
            self.progress(id, pct, format!("Scanned {}", ds.name));
        }
        let _ = tokio::fs::remove_file(&exclusion_path).await;

        if cancel.is_cancelled() {
            return self.fail(id, "cancelled");
        }

        // Post-scan unknown resolution (spec §4.I).
        let mut failed_resolutions: Vec<i64> = Vec::new();
        let unknown_ids: Vec<i64> = games.values().filter(|g| g.is_unknown()).map(|g| g.game_app_id).collect();
        for unknown_app_id in unknown_ids {
            let Some(unknown) = games.get(&unknown_app_id).cloned() else { continue };
            let Some(depot_id) = unknown.depot_ids.first().copied() else { continue };
            match self.depot_mappings.owner_for_depot(depot_id).await {
                Ok(Some(owner)) => {
                    let resolved_name = owner
                        .app_name
                        .clone()
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| format!("App {}", owner.app_id));

                    let existing_target = match games.get(&owner.app_id).cloned() {
                        Some(t) => Some(t),
                        None => match self.detections.get_game(owner.app_id).await {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(depot_id, error = %e, "db lookup failed during unknown resolution");
                                None
                            }
                        },
                    };

                    if let Some(existing_target) = existing_target {
                        if existing_target.game_app_id != unknown_app_id {
                            let merged = merge_into(existing_target, unknown);
                            games.insert(owner.app_id, merged);
                            games.remove(&unknown_app_id);
                        }
                    } else {
                        games.remove(&unknown_app_id);
                        let mut resolved = unknown;
                        resolved.game_app_id = owner.app_id;
                        resolved.game_name = resolved_name;
                        games.insert(owner.app_id, resolved);
                    }
                }
                Ok(None) => failed_resolutions.push(depot_id),
                Err(e) => warn!(depot_id, error = %e, "owner lookup failed during unknown resolution"),
            }
        }
        self.progress(id, 90, "Mapped unknown depots");

        if !failed_resolutions.is_empty() {
            let record = OperationStateRecord {
                key: "failedDepotResolutions".to_string(),
                r#type: "GameCacheDetection".to_string(),
                status: "Running".to_string(),
                message: format!("{} depot ids unresolved", failed_resolutions.len()),
                data_blob: serde_json::json!({ "depot_ids": failed_resolutions }),
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = self.state.save_state(&record).await {
                warn!(error = %e, "failed to persist unresolved depot ids");
            }
        }

        let game_batch: Vec<CachedGameDetection> = games.into_values().collect();
        let service_batch: Vec<CachedServiceDetection> = services.into_values().collect();

        let write_result = if incremental {
            self.write_incremental(&game_batch, &service_batch).await
        } else {
            async {
                self.detections.replace_all_games(&game_batch).await?;
                self.detections.replace_all_services(&service_batch).await?;
                Ok(())
            }
            .await
        };
        if let Err(e) = write_result {
            return self.fail(id, e.to_string());
        }

        self.progress(id, 100, "Persisted");
        info!(operation_id = %id, games = game_batch.len(), services = service_batch.len(), "game cache scan complete");
        self.tracker.complete(id, true, None);
        schedule_eviction(self.tracker.clone(), id);
        self.bus.notify_all(NotificationEvent::GameDetectionComplete {
            operation_id: id,
            payload: NotificationPayload::from_value(serde_json::json!({
                "games": game_batch.len(),
                "services": service_batch.len(),
            })),
        });
    }

    async fn write_incremental(
        &self,
        games: &[CachedGameDetection],
        services: &[CachedServiceDetection],
    ) -> lancache_storage::Result<()> {
        for g in games {
            self.detections.upsert_game(g).await?;
        }
        for s in services {
            self.detections.upsert_service(s).await?;
        }
        Ok(())
    }
}

fn merge_games(
    acc: &mut HashMap<i64, CachedGameDetection>,
    incoming: Vec<GameDetectorGame>,
    datasource: &str,
    now: chrono::DateTime<chrono::Utc>,
) {
    for g in incoming {
        acc.entry(g.game_app_id)
            .and_modify(|existing| {
                existing.cache_files_found += g.cache_files_found;
                existing.total_size_bytes += g.total_size_bytes;
                union_into(&mut existing.depot_ids, &g.depot_ids);
                union_into(&mut existing.cache_file_paths, &g.cache_file_paths);
                extend_capped(&mut existing.sample_urls, &g.sample_urls, MAX_SAMPLE_URLS);
                union_into(&mut existing.datasources, &[datasource.to_string()]);
                existing.last_detected_utc = now;
            })
            .or_insert_with(|| CachedGameDetection {
                game_app_id: g.game_app_id,
                game_name: g.game_name,
                cache_files_found: g.cache_files_found,
                total_size_bytes: g.total_size_bytes,
                depot_ids: g.depot_ids,
                sample_urls: g.sample_urls.into_iter().take(MAX_SAMPLE_URLS).collect(),
                cache_file_paths: g.cache_file_paths,
                datasources: vec![datasource.to_string()],
                last_detected_utc: now,
                created_at_utc: now,
            });
    }
}

fn merge_services(
    acc: &mut HashMap<String, CachedServiceDetection>,
    incoming: Vec<GameDetectorService>,
    datasource: &str,
    now: chrono::DateTime<chrono::Utc>,
) {
    for s in incoming {
        let key = s.service_name.to_ascii_lowercase();
        acc.entry(key)
            .and_modify(|existing| {
                existing.cache_files_found += s.cache_files_found;
                existing.total_size_bytes += s.total_size_bytes;
                union_into(&mut existing.cache_file_paths, &s.cache_file_paths);
                extend_capped(&mut existing.sample_urls, &s.sample_urls, MAX_SAMPLE_URLS);
                union_into(&mut existing.datasources, &[datasource.to_string()]);
                existing.last_detected_utc = now;
            })
            .or_insert_with(|| CachedServiceDetection {
                service_name: s.service_name,
                cache_files_found: s.cache_files_found,
                total_size_bytes: s.total_size_bytes,
                sample_urls: s.sample_urls.into_iter().take(MAX_SAMPLE_URLS).collect(),
                cache_file_paths: s.cache_file_paths,
                datasources: vec![datasource.to_string()],
                last_detected_utc: now,
                created_at_utc: now,
            });
    }
}

/// Merges `from` (an unknown-placeholder row being resolved) into `into`
/// (the pre-existing entry for the app it resolves to), per spec §4.I's
/// "sum counts, union depots and paths".
fn merge_into(mut into: CachedGameDetection, from: CachedGameDetection) -> CachedGameDetection {
    into.cache_files_found += from.cache_files_found;
    into.total_size_bytes += from.total_size_bytes;
    union_into(&mut into.depot_ids, &from.depot_ids);
    union_into(&mut into.cache_file_paths, &from.cache_file_paths);
    extend_capped(&mut into.sample_urls, &from.sample_urls, MAX_SAMPLE_URLS);
    union_into(&mut into.datasources, &from.datasources);
    into
}

fn union_into<T: PartialEq + Clone>(existing: &mut Vec<T>, incoming: &[T]) {
    for v in incoming {
        if !existing.contains(v) {
            existing.push(v.clone());
        }
    }
}

fn extend_capped(existing: &mut Vec<String>, incoming: &[String], cap: usize) {
    for v in incoming {
        if existing.len() >= cap {
            break;
        }
        if !existing.contains(v) {
            existing.push(v.clone());
        }
    }
}

#[cfg(test)]
#[path = "game_detection_tests.rs"]
mod tests;
