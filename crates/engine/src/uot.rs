// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified Operation Tracker (spec §4.F): the process-wide registry of
//! active jobs. Every long-running background task is `Register`ed here
//! before it starts and `Complete`d when it ends; callers poll progress
//! through this registry rather than through the task itself.

use lancache_core::operation::{
    EntityKey, KillableProcess, Operation, OperationId, OperationMetadata, OperationStatus,
    OperationType,
};
use lancache_core::{Clock, CoreError, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Grace window a terminal operation stays reachable by id before eviction
/// (spec §3: "≈10-15 s").
pub const EVICTION_GRACE: Duration = Duration::from_secs(12);

struct Registry {
    operations: HashMap<OperationId, Operation>,
    entity_index: HashMap<(OperationType, EntityKey), OperationId>,
}

/// The central job registry. Generic over [`Clock`] so tests can control
/// `started_at`/`completed_at` timestamps deterministically; production
/// code uses [`SystemClock`].
pub struct UnifiedOperationTracker<C: Clock = SystemClock> {
    registry: Mutex<Registry>,
    clock: C,
}

impl UnifiedOperationTracker<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for UnifiedOperationTracker<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> UnifiedOperationTracker<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            registry: Mutex::new(Registry { operations: HashMap::new(), entity_index: HashMap::new() }),
            clock,
        }
    }

    /// Allocates a new operation in `Running` state. If `metadata` carries
    /// an [`EntityKey`] already mapped to a non-terminal operation of the
    /// same type, fails with `AlreadyInProgress` instead of registering a
    /// duplicate (spec §4.F).
    pub fn register(
        &self,
        operation_type: OperationType,
        name: impl Into<String>,
        cancel: CancellationToken,
        metadata: OperationMetadata,
    ) -> Result<OperationId, CoreError> {
        let entity_key = metadata.entity_key();
        let mut registry = self.registry.lock();

        if let Some(key) = &entity_key {
            if let Some(existing_id) = registry.entity_index.get(&(operation_type, key.clone())) {
                if let Some(existing) = registry.operations.get(existing_id) {
                    if !existing.status.is_terminal() {
                        return Err(CoreError::AlreadyInProgress(format!(
                            "{operation_type} already running for {key}"
                        )));
                    }
                }
            }
        }

        let now = self.clock.epoch_ms();
        let started_at = std::time::UNIX_EPOCH + Duration::from_millis(now);
        let op = Operation::new(operation_type, name, cancel, metadata, started_at);
        let id = op.id;

        if let Some(key) = entity_key {
            registry.entity_index.insert((operation_type, key), id);
        }
        registry.operations.insert(id, op);
        info!(operation_id = %id, operation_type = %operation_type, "operation registered");
        Ok(id)
    }

    /// Idempotent: flips `Running` to `Cancelling` and signals the cancel
    /// token. No-op (success) on already-cancelling/terminal operations;
    /// `NotFound` if the id is unknown (spec §4.F).
    pub fn cancel(&self, id: OperationId) -> Result<(), CoreError> {
        let mut registry = self.registry.lock();
        let op = registry
            .operations
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("operation {id}")))?;
        if op.status.is_terminal() || op.status == OperationStatus::Cancelling {
            return Ok(());
        }
        op.status = OperationStatus::Cancelling;
        op.cancelled = true;
        if let Some(cancel) = &op.handles.cancel {
            cancel.cancel();
        }
        Ok(())
    }

    /// Clamps `percent` to [0, 100]. Unknown ids are logged and ignored,
    /// never an error (spec §4.F).
    pub fn update_progress(&self, id: OperationId, percent: u8, message: impl Into<String>) {
        let mut registry = self.registry.lock();
        match registry.operations.get_mut(&id) {
            Some(op) => op.apply_progress(percent, message),
            None => warn!(operation_id = %id, "update_progress for unknown operation"),
        }
    }

    /// Applies `mutator` to the operation's metadata atomically.
    pub fn update_metadata(&self, id: OperationId, mutator: impl FnOnce(&mut OperationMetadata)) {
        let mut registry = self.registry.lock();
        if let Some(op) = registry.operations.get_mut(&id) {
            mutator(&mut op.metadata);
        }
    }

    /// Attaches a worker process handle so a later `ForceKill` can reach it.
    pub fn attach_worker_process(&self, id: OperationId, process: Arc<dyn KillableProcess>) {
        let mut registry = self.registry.lock();
        if let Some(op) = registry.operations.get_mut(&id) {
            op.handles.worker_process = Some(process);
        }
    }

    /// Terminal transition. Removes the entity-key index entry and leaves
    /// the operation reachable by id for [`EVICTION_GRACE`] before the
    /// caller is expected to evict it via [`Self::evict`].
    pub fn complete(&self, id: OperationId, success: bool, error: Option<String>) {
        let mut registry = self.registry.lock();
        let now = std::time::UNIX_EPOCH + Duration::from_millis(self.clock.epoch_ms());
        if let Some(op) = registry.operations.get_mut(&id) {
            op.complete(success, error, now);
        }
        drop_entity_index_entry(&mut registry, id);
    }

    /// Removes a terminal operation from the registry. Safe to call
    /// multiple times; no-ops on unknown or non-terminal ids.
    pub fn evict(&self, id: OperationId) {
        let mut registry = self.registry.lock();
        if registry.operations.get(&id).is_some_and(|op| op.status.is_terminal()) {
            registry.operations.remove(&id);
        }
    }

    pub fn get_operation(&self, id: OperationId) -> Option<Operation> {
        self.registry.lock().operations.get(&id).cloned()
    }

    pub fn get_active_operations(&self, type_filter: Option<OperationType>) -> Vec<Operation> {
        self.registry
            .lock()
            .operations
            .values()
            .filter(|op| !op.status.is_terminal())
            .filter(|op| type_filter.map_or(true, |t| op.operation_type == t))
            .cloned()
            .collect()
    }

    pub fn get_operation_by_entity_key(
        &self,
        operation_type: OperationType,
        key: &EntityKey,
    ) -> Option<Operation> {
        let registry = self.registry.lock();
        let id = registry.entity_index.get(&(operation_type, key.clone()))?;
        registry.operations.get(id).cloned()
    }
}

/// Split into its own `Arc<Self>`-receiver impl so it can hand itself to
/// [`schedule_eviction`] the same way every other terminal transition in
/// this workspace does (spec §3: "terminal operations are retained for a
/// short grace window ... then evicted").
impl<C: Clock + Send + Sync + 'static> UnifiedOperationTracker<C> {
    /// Signals cancellation and force-kills the worker process tree if one
    /// is attached, then immediately transitions to `Cancelled` (spec
    /// §4.F). Idempotent.
    pub fn force_kill(self: &Arc<Self>, id: OperationId) -> Result<(), CoreError> {
        {
            let mut registry = self.registry.lock();
            let op = registry
                .operations
                .get_mut(&id)
                .ok_or_else(|| CoreError::NotFound(format!("operation {id}")))?;
            if op.status.is_terminal() {
                return Ok(());
            }
            op.cancelled = true;
            if let Some(cancel) = &op.handles.cancel {
                cancel.cancel();
            }
            if let Some(process) = &op.handles.worker_process {
                process.kill_tree();
            }
            let now = std::time::UNIX_EPOCH + Duration::from_millis(self.clock.epoch_ms());
            op.message = "Force killed by user".to_string();
            op.complete(false, None, now);
            drop_entity_index_entry(&mut registry, id);
        }
        schedule_eviction(self.clone(), id);
        warn!(operation_id = %id, "operation force-killed");
        Ok(())
    }
}

fn drop_entity_index_entry(registry: &mut Registry, id: OperationId) {
    registry.entity_index.retain(|_, mapped_id| *mapped_id != id);
}

/// Spawns a background task that removes `id` from the tracker after the
/// standard grace window. Call this right after [`UnifiedOperationTracker::complete`].
pub fn schedule_eviction<C: Clock + Send + Sync + 'static>(
    tracker: Arc<UnifiedOperationTracker<C>>,
    id: OperationId,
) {
    tokio::spawn(async move {
        tokio::time::sleep(EVICTION_GRACE).await;
        tracker.evict(id);
    });
}

#[cfg(test)]
#[path = "uot_tests.rs"]
mod tests;
