// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live Log Monitor (spec §4.K): tails each datasource's access log and
//! hands incremental growth off to the `log-processor` helper.
//!
//! Single-flight is enforced the same way every other job flow enforces it:
//! each datasource registers its `LogProcessing` operation under an entity
//! key of its own name, so a concurrent manual processing run or a removal
//! in progress for that datasource simply fails the UOT's `AlreadyInProgress`
//! check and this tick is skipped. Removal flows additionally hold the pause
//! gate for their whole critical section, which this monitor honors up
//! front, once per tick, before touching any datasource.

use crate::error::Result;
use lancache_core::operation::{OperationMetadata, OperationType};
use lancache_core::{Clock, CoreError, Datasource, NotificationEvent, NotificationPayload, SystemClock};
use lancache_engine::{schedule_eviction, DatasourceRegistry, NotificationBus, PauseGate, UnifiedOperationTracker};
use lancache_storage::{LogPosition, LogPositionStore};
use lancache_supervisor::NativeWorkerSupervisor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Poll cadence (spec §4.K: "≈1 s").
pub const LOOP_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum growth since the last processed tick before a datasource is
/// re-scanned (spec §4.K, §8: "≈10 KB", exactly 10,000 bytes at the
/// boundary).
pub const GROWTH_THRESHOLD_BYTES: u64 = 10_000;

/// Retries for a transient (non-permission) I/O error while counting lines
/// (spec §4.K: "retry up to 5 times with exponential backoff").
const LINE_COUNT_RETRIES: u32 = 5;

#[derive(Default)]
struct DatasourceState {
    file_size_seen: u64,
    consecutive_permission_errors: u32,
    backoff_until: Option<Instant>,
    was_absent: bool,
}

/// Tracks per-datasource tail state and drives the `log-processor` helper
/// forward as each access log grows.
pub struct LiveLogMonitor<C: Clock = SystemClock> {
    tracker: Arc<UnifiedOperationTracker<C>>,
    supervisor: Arc<NativeWorkerSupervisor>,
    bus: Arc<NotificationBus>,
    pause_gate: Arc<PauseGate>,
    positions: Arc<LogPositionStore>,
    processor_bin: PathBuf,
    clock: C,
    state: Mutex<HashMap<String, DatasourceState>>,
}

impl LiveLogMonitor<SystemClock> {
    pub fn new(
        tracker: Arc<UnifiedOperationTracker<SystemClock>>,
        supervisor: Arc<NativeWorkerSupervisor>,
        bus: Arc<NotificationBus>,
        pause_gate: Arc<PauseGate>,
        positions: Arc<LogPositionStore>,
        processor_bin: PathBuf,
    ) -> Self {
        Self::with_clock(tracker, supervisor, bus, pause_gate, positions, processor_bin, SystemClock)
    }
}

impl<C: Clock> LiveLogMonitor<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn with_clock(
        tracker: Arc<UnifiedOperationTracker<C>>,
        supervisor: Arc<NativeWorkerSupervisor>,
        bus: Arc<NotificationBus>,
        pause_gate: Arc<PauseGate>,
        positions: Arc<LogPositionStore>,
        processor_bin: PathBuf,
        clock: C,
    ) -> Self {
        Self {
            tracker,
            supervisor,
            bus,
            pause_gate,
            positions,
            processor_bin,
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Seeds a persisted position for every enabled datasource that has
    /// never had one. Fresh installs seek to end-of-file so the first tick
    /// doesn't replay the whole access log; a datasource that already has a
    /// row is left untouched (spec §4.K: "Startup behavior").
    pub async fn initialize_positions(&self, datasources: &[Datasource]) -> Result<()> {
        for ds in datasources.iter().filter(|d| d.enabled) {
            if self.positions.get(&ds.name).await?.is_some() {
                continue;
            }
            let eof = count_lines_with_retry(&ds.access_log_path()).await.unwrap_or(0);
            self.positions
                .save(&ds.name, LogPosition { line_position: eof, logs_ever_processed: false })
                .await?;
        }
        Ok(())
    }

    /// Runs one pass over every enabled datasource. No-ops entirely while
    /// the pause gate is held.
    pub async fn tick(&self, datasources: &[Datasource]) {
        if self.pause_gate.is_paused() {
            return;
        }
        for ds in datasources.iter().filter(|d| d.enabled) {
            self.process_datasource(ds).await;
        }
    }

    async fn process_datasource(&self, ds: &Datasource) {
        if self.in_backoff(&ds.name) {
            return;
        }

        let log_path = ds.access_log_path();
        let len = match tokio::fs::metadata(&log_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.note_absent(&ds.name);
                return;
            }
            Err(e) => {
                warn!(datasource = %ds.name, error = %e, "failed to stat access log");
                return;
            }
        };

        let file_size_seen = {
            let mut state = self.state.lock();
            let entry = state.entry(ds.name.clone()).or_default();
            entry.was_absent = false;
            entry.file_size_seen
        };
        if len.saturating_sub(file_size_seen) < GROWTH_THRESHOLD_BYTES {
            return;
        }

        let stored_position = match self.positions.get(&ds.name).await {
            Ok(p) => p.map(|p| p.line_position).unwrap_or(0),
            Err(e) => {
                warn!(datasource = %ds.name, error = %e, "failed to read persisted log position");
                return;
            }
        };

        let current_line_count = match count_lines_with_retry(&log_path).await {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                self.record_permission_error(&ds.name);
                return;
            }
            Err(e) => {
                warn!(datasource = %ds.name, error = %e, "giving up counting access log lines this tick");
                return;
            }
        };
        self.record_permission_cleared(&ds.name);

        let start_position = stored_position.min(current_line_count);
        self.run_processor(ds, &log_path, start_position, current_line_count, len).await;
    }

    async fn run_processor(
        &self,
        ds: &Datasource,
        log_path: &Path,
        start_position: u64,
        current_line_count: u64,
        file_len: u64,
    ) {
        let cancel = CancellationToken::new();
        let mut metadata = OperationMetadata::empty();
        metadata.set("entity_key", ds.name.clone());
        let id = match self.tracker.register(
            OperationType::LogProcessing,
            format!("Log processing: {}", ds.name),
            cancel.clone(),
            metadata,
        ) {
            Ok(id) => id,
            // A concurrent manual processing run or a removal already owns
            // this datasource's log file; skip this tick (spec §4.K).
            Err(CoreError::AlreadyInProgress(_)) => return,
            Err(e) => {
                warn!(datasource = %ds.name, error = %e, "failed to register log processing operation");
                return;
            }
        };
        self.bus.notify_all(NotificationEvent::LogProcessingStarted {
            operation_id: id,
            datasource: ds.name.clone(),
        });

        if let Err(e) = self.supervisor.validate_binary_exists(&self.processor_bin, "log-processor") {
            self.tracker.complete(id, false, Some(e.to_string()));
            schedule_eviction(self.tracker.clone(), id);
            return;
        }

        let args = vec![
            log_path.display().to_string(),
            start_position.to_string(),
            "--silent".to_string(),
            "--datasource".to_string(),
            ds.name.clone(),
        ];
        let (child, handle) = match self.supervisor.spawn(&self.processor_bin, &args, None, &Default::default()) {
            Ok(v) => v,
            Err(e) => {
                self.tracker.complete(id, false, Some(e.to_string()));
                schedule_eviction(self.tracker.clone(), id);
                return;
            }
        };
        self.tracker.attach_worker_process(id, handle.clone());

        let result = self.supervisor.execute_process(child, &handle, &cancel).await;
        match result {
            Ok(r) if r.was_cancelled() => {
                self.tracker.complete(id, false, None);
                schedule_eviction(self.tracker.clone(), id);
            }
            Ok(r) if r.exit_code != 0 => {
                let err = CoreError::WorkerFailed { exit_code: r.exit_code, message: r.stderr_tail(2000) };
                self.tracker.complete(id, false, Some(err.to_string()));
                schedule_eviction(self.tracker.clone(), id);
            }
            Ok(_) => {
                {
                    let mut state = self.state.lock();
                    state.entry(ds.name.clone()).or_default().file_size_seen = file_len;
                }
                if let Err(e) = self
                    .positions
                    .save(&ds.name, LogPosition { line_position: current_line_count, logs_ever_processed: true })
                    .await
                {
                    warn!(datasource = %ds.name, error = %e, "failed to persist log position");
                }
                self.tracker.complete(id, true, None);
                schedule_eviction(self.tracker.clone(), id);
                self.bus.notify_all(NotificationEvent::LogProcessingComplete {
                    operation_id: id,
                    datasource: ds.name.clone(),
                    payload: NotificationPayload::from_value(serde_json::json!({
                        "lines_processed": current_line_count.saturating_sub(start_position),
                    })),
                });
            }
            Err(e) => {
                self.tracker.complete(id, false, Some(e.to_string()));
                schedule_eviction(self.tracker.clone(), id);
            }
        }
    }

    fn in_backoff(&self, name: &str) -> bool {
        let state = self.state.lock();
        match state.get(name).and_then(|s| s.backoff_until) {
            Some(until) => self.clock.now() < until,
            None => false,
        }
    }

    fn note_absent(&self, name: &str) {
        let mut state = self.state.lock();
        let entry = state.entry(name.to_string()).or_default();
        if !entry.was_absent {
            info!(datasource = %name, "access log absent");
            entry.was_absent = true;
        }
    }

    fn record_permission_error(&self, name: &str) {
        let mut state = self.state.lock();
        let entry = state.entry(name.to_string()).or_default();
        entry.consecutive_permission_errors += 1;
        let backoff_secs = permission_backoff_secs(entry.consecutive_permission_errors);
        entry.backoff_until = Some(self.clock.now() + Duration::from_secs(backoff_secs));
        warn!(
            datasource = %name,
            consecutive_errors = entry.consecutive_permission_errors,
            backoff_secs,
            "permission denied reading access log"
        );
    }

    fn record_permission_cleared(&self, name: &str) {
        let mut state = self.state.lock();
        let entry = state.entry(name.to_string()).or_default();
        if entry.consecutive_permission_errors > 0 {
            info!(datasource = %name, "permissions restored");
        }
        entry.consecutive_permission_errors = 0;
        entry.backoff_until = None;
    }
}

/// `min(2^(n-1), 60)` seconds (spec §4.K), shift-capped so `n` can grow
/// without overflowing.
fn permission_backoff_secs(consecutive_errors: u32) -> u64 {
    let exp = consecutive_errors.saturating_sub(1).min(6);
    (1u64 << exp).min(60)
}

async fn count_lines(path: &Path) -> std::io::Result<u64> {
    let bytes = tokio::fs::read(path).await?;
    Ok(bytes.iter().filter(|&&b| b == b'\n').count() as u64)
}

async fn count_lines_with_retry(path: &Path) -> std::io::Result<u64> {
    let mut attempt = 0u32;
    loop {
        match count_lines(path).await {
            Ok(n) => return Ok(n),
            // Permission errors are handled by the caller's backoff policy,
            // not retried in-tick.
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= LINE_COUNT_RETRIES {
                    return Err(e);
                }
                tokio::time::sleep(Duration::from_millis(50 * 2u64.pow(attempt))).await;
            }
        }
    }
}

/// Spawns the background monitor loop; runs until `cancel` fires. Seeds
/// startup positions once before entering the tick loop.
pub fn spawn_monitor_loop<C: Clock + Send + Sync + 'static>(
    monitor: Arc<LiveLogMonitor<C>>,
    registry: Arc<DatasourceRegistry>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        if let Err(e) = monitor.initialize_positions(&registry.get_datasources()).await {
            warn!(error = %e, "failed to initialize log monitor positions");
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(LOOP_INTERVAL) => {
                    monitor.tick(&registry.get_datasources()).await;
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
