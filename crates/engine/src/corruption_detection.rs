// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Corruption Detection Service (spec §4.H): sequential multi-datasource
//! scans with rate-limited progress forwarding and a grace-period de-dup on
//! removal so a user-triggered `RemoveCachedService` isn't immediately
//! contradicted by a still-in-flight scan.

use crate::error::{EngineError, Result};
use crate::notify::NotificationBus;
use crate::uot::{schedule_eviction, UnifiedOperationTracker};
use lancache_core::operation::{OperationId, OperationMetadata, OperationType};
use lancache_core::{Clock, CoreError, Datasource, NotificationEvent, NotificationPayload, SystemClock};
use lancache_protocol::{CorruptionProgress, CorruptionSummary};
use lancache_storage::{CachedCorruptionDetection, DetectionStore};
use lancache_supervisor::{poll_progress, NativeWorkerSupervisor, DEFAULT_POLL_INTERVAL};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fixed entity key: at most one corruption scan runs process-wide at a
/// time, the same single-flight posture as the cache clearer (spec §4.G/H).
pub const ENTITY_KEY: &str = "corruption_detection";

/// How long a `RemoveCachedService` call suppresses that service name from
/// detection results (spec §4.H: "5-minute TTL").
pub const RECENTLY_REMOVED_TTL: Duration = Duration::from_secs(5 * 60);

/// Minimum percent-complete delta before a progress event is forwarded,
/// absent a message change (spec §4.H).
const PROGRESS_PERCENT_STEP: u8 = 5;

#[derive(Clone)]
pub struct CorruptionDetectionService<C: Clock = SystemClock> {
    tracker: Arc<UnifiedOperationTracker<C>>,
    supervisor: Arc<NativeWorkerSupervisor>,
    bus: Arc<NotificationBus>,
    detections: Arc<DetectionStore>,
    manager_bin: PathBuf,
    operations_dir: PathBuf,
    recently_removed: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<C: Clock + Send + Sync + 'static> CorruptionDetectionService<C> {
    pub fn new(
        tracker: Arc<UnifiedOperationTracker<C>>,
        supervisor: Arc<NativeWorkerSupervisor>,
        bus: Arc<NotificationBus>,
        detections: Arc<DetectionStore>,
        manager_bin: PathBuf,
        operations_dir: PathBuf,
    ) -> Self {
        Self {
            tracker,
            supervisor,
            bus,
            detections,
            manager_bin,
            operations_dir,
            recently_removed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records that `service_name` was just removed by the user, so the
    /// next scan's results won't resurrect it (spec §4.H, §8 scenario).
    pub fn mark_recently_removed(&self, service_name: &str) {
        self.recently_removed.lock().insert(service_name.to_ascii_lowercase(), Instant::now());
    }

    fn is_recently_removed(&self, service_name: &str) -> bool {
        let mut map = self.recently_removed.lock();
        let key = service_name.to_ascii_lowercase();
        match map.get(&key) {
            Some(at) if at.elapsed() < RECENTLY_REMOVED_TTL => true,
            Some(_) => {
                map.remove(&key);
                false
            }
            None => false,
        }
    }

    pub async fn start_detection(
        &self,
        datasources: Vec<Datasource>,
        timezone: String,
        threshold: u32,
        no_cache_check: bool,
    ) -> Result<OperationId> {
        let usable: Vec<Datasource> = datasources.into_iter().filter(|d| d.enabled).collect();
        if usable.is_empty() {
            return Err(EngineError::Core(CoreError::NotFound("no enabled datasources".into())));
        }

        let cancel = CancellationToken::new();
        let mut metadata = OperationMetadata::empty();
        metadata.set("entity_key", ENTITY_KEY);
        let id = self.tracker.register(
            OperationType::CorruptionDetection,
            "Corruption scan",
            cancel.clone(),
            metadata,
        )?;
        self.bus.notify_all(NotificationEvent::CorruptionDetectionStarted { operation_id: id });

        let this = self.clone();
        tokio::spawn(async move {
            this.run(id, usable, timezone, threshold, no_cache_check, cancel).await;
        });
        Ok(id)
    }

    async fn run(
        &self,
        id: OperationId,
        datasources: Vec<Datasource>,
        timezone: String,
        threshold: u32,
        no_cache_check: bool,
        cancel: CancellationToken,
    ) {
        let n = datasources.len();
        let mut service_counts: HashMap<String, i64> = HashMap::new();

        for (idx, ds) in datasources.iter().enumerate() {
            if cancel.is_cancelled() {
                self.tracker.complete(id, false, None);
                schedule_eviction(self.tracker.clone(), id);
                return;
            }

            if let Err(e) = self.supervisor.validate_binary_exists(&self.manager_bin, "corruption-manager") {
                self.tracker.complete(id, false, Some(e.to_string()));
                schedule_eviction(self.tracker.clone(), id);
                return;
            }

            let progress_path = self.operations_dir.join(format!("{id}.corruption.json"));
            let mut args = vec![
                "summary".to_string(),
                ds.log_path.display().to_string(),
                ds.cache_path.display().to_string(),
                progress_path.display().to_string(),
                timezone.clone(),
                threshold.to_string(),
            ];
            if no_cache_check {
                args.push("--no-cache-check".to_string());
            }

            let (child, handle) = match self.supervisor.spawn(&self.manager_bin, &args, None, &Default::default()) {
                Ok(v) => v,
                Err(e) => {
                    self.tracker.complete(id, false, Some(e.to_string()));
                    schedule_eviction(self.tracker.clone(), id);
                    return;
                }
            };
            self.tracker.attach_worker_process(id, handle.clone());

            let tracker = self.tracker.clone();
            let bus = self.bus.clone();
            let poll_cancel = cancel.clone();
            let poll_path = progress_path.clone();
            let last_state = Arc::new(Mutex::new((String::new(), 0u8)));
            let poll_task = tokio::spawn({
                let last_state = last_state.clone();
                async move {
                    poll_progress::<CorruptionProgress, _>(&poll_path, DEFAULT_POLL_INTERVAL, &poll_cancel, |p| {
                        let overall_pct =
                            (((idx as f64) + f64::from(p.percent_complete) / 100.0) / n as f64 * 100.0) as u8;
                        let mut last = last_state.lock();
                        let message_changed = last.0 != p.message;
                        let percent_moved = overall_pct.abs_diff(last.1) >= PROGRESS_PERCENT_STEP;
                        if message_changed || percent_moved {
                            last.0 = p.message.clone();
                            last.1 = overall_pct;
                            tracker.update_progress(id, overall_pct, p.message.clone());
                            bus.notify_all(NotificationEvent::CorruptionDetectionProgress {
                                operation_id: id,
                                percent_complete: overall_pct,
                                message: p.message,
                            });
                        }
                    })
                    .await;
                }
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
                    let err = CoreError::WorkerFailed { exit_code: r.exit_code, message: r.stderr_tail(2000) };
                    self.tracker.complete(id, false, Some(err.to_string()));
                    schedule_eviction(self.tracker.clone(), id);
                    return;
                }
                Ok(r) => {
                    match serde_json::from_slice::<CorruptionSummary>(&r.stdout) {
                        Ok(summary) => {
                            for (service, count) in summary.service_counts {
                                *service_counts.entry(service).or_insert(0) += count;
                            }
                        }
                        Err(e) => {
                            let err = CoreError::Protocol(format!("corruption-manager output: {e}"));
                            self.tracker.complete(id, false, Some(err.to_string()));
                            schedule_eviction(self.tracker.clone(), id);
                            return;
                        }
                    }
                }
                Err(e) => {
                    self.tracker.complete(id, false, Some(e.to_string()));
                    schedule_eviction(self.tracker.clone(), id);
                    return;
                }
            }
            self.supervisor.delete_temporary_file(&progress_path).await;
        }

        // Filter names removed by the user within the grace window (spec
        // §4.H, §8) before either persisting or publishing.
        service_counts.retain(|name, _| !self.is_recently_removed(name));

        let now = chrono::Utc::now();
        let entries: Vec<CachedCorruptionDetection> = service_counts
            .iter()
            .map(|(service_name, count)| CachedCorruptionDetection {
                service_name: service_name.clone(),
                corrupted_chunk_count: *count,
                last_detected_utc: now,
                created_at_utc: now,
            })
            .collect();

        if let Err(e) = self.detections.replace_all_corruption(&entries).await {
            self.tracker.complete(id, false, Some(e.to_string()));
            schedule_eviction(self.tracker.clone(), id);
            return;
        }

        info!(operation_id = %id, services = service_counts.len(), "corruption scan complete");
        self.tracker.complete(id, true, None);
        schedule_eviction(self.tracker.clone(), id);
        self.bus.notify_all(NotificationEvent::CorruptionDetectionComplete {
            operation_id: id,
            payload: NotificationPayload::from_value(
                serde_json::to_value(&service_counts).unwrap_or(serde_json::Value::Null),
            ),
        });
    }
}

#[cfg(test)]
#[path = "corruption_detection_tests.rs"]
mod tests;
