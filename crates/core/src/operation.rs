// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Operation` record tracked by the Unified Operation Tracker (UOT).
//!
//! An `Operation` is the unit the rest of the system polls for progress: a
//! cache clear, a corruption scan, a game-cache detection pass, a removal, a
//! prefill session, or an ad-hoc log-processing run. The UOT itself lives in
//! `lancache-engine`; this crate only defines the shape so that every other
//! subsystem can depend on it without depending on the engine.

use crate::id::IdBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Opaque identifier for an `Operation`. Spec §3 mandates a uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub uuid::Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tagged operation kind, mirrored in the wire protocol's status DTOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    LogProcessing,
    CacheClearing,
    CorruptionDetection,
    CorruptionRemoval,
    GameDetection,
    GameRemoval,
    ServiceRemoval,
    Prefill,
}

crate::simple_display! {
    OperationType {
        LogProcessing => "log_processing",
        CacheClearing => "cache_clearing",
        CorruptionDetection => "corruption_detection",
        CorruptionRemoval => "corruption_removal",
        GameDetection => "game_detection",
        GameRemoval => "game_removal",
        ServiceRemoval => "service_removal",
        Prefill => "prefill",
    }
}

/// Lifecycle status of an `Operation`. Terminal states never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled)
    }
}

crate::simple_display! {
    OperationStatus {
        Pending => "pending",
        Running => "running",
        Cancelling => "cancelling",
        Cancelled => "cancelled",
        Completed => "completed",
        Failed => "failed",
    }
}

/// A process tree the UOT can force-kill on behalf of an `Operation`.
///
/// Implemented by `lancache-supervisor`'s `ProcessHandle`; kept as a trait
/// here so `lancache-core` never depends on the supervisor crate.
pub trait KillableProcess: Send + Sync {
    /// Terminate the process and any children it spawned. Best-effort: a
    /// process that already exited is not an error.
    fn kill_tree(&self);
}

/// (OperationType, EntityKey) identifies "the one active operation" for a
/// logical entity — a game app id, a lower-cased service name, or a
/// datasource-scoped cache clear.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey(pub IdBuf);

impl EntityKey {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(IdBuf::new(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

/// Type-specific payload carried by an `Operation`. Kept as a JSON value
/// (mirroring the durable `DataBlob` in `OperationState`) so new operation
/// kinds never need a storage migration of the in-memory registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationMetadata(pub Value);

impl OperationMetadata {
    pub fn empty() -> Self {
        Self(Value::Object(Default::default()))
    }

    pub fn entity_key(&self) -> Option<EntityKey> {
        self.0.get("entity_key")?.as_str().map(EntityKey::new)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.to_string(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Runtime-only handles an `Operation` carries while active. Never
/// serialized; cleared on terminal transition.
#[derive(Clone, Default)]
pub struct OperationHandles {
    pub cancel: Option<CancellationToken>,
    pub worker_process: Option<Arc<dyn KillableProcess>>,
}

impl fmt::Debug for OperationHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandles")
            .field("cancel", &self.cancel.is_some())
            .field("worker_process", &self.worker_process.is_some())
            .finish()
    }
}

/// A long-running job tracked by the Unified Operation Tracker.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub operation_type: OperationType,
    pub name: String,
    pub status: OperationStatus,
    pub message: String,
    pub percent_complete: u8,
    pub started_at: SystemTime,
    pub completed_at: Option<SystemTime>,
    pub success: bool,
    pub cancelled: bool,
    pub error: Option<String>,
    pub metadata: OperationMetadata,
    #[doc(hidden)]
    pub handles: OperationHandles,
}

impl Operation {
    pub fn new(
        operation_type: OperationType,
        name: impl Into<String>,
        cancel: CancellationToken,
        metadata: OperationMetadata,
        now: SystemTime,
    ) -> Self {
        Self {
            id: OperationId::new(),
            operation_type,
            name: name.into(),
            status: OperationStatus::Running,
            message: String::new(),
            percent_complete: 0,
            started_at: now,
            completed_at: None,
            success: false,
            cancelled: false,
            error: None,
            metadata,
            handles: OperationHandles { cancel: Some(cancel), worker_process: None },
        }
    }

    pub fn entity_key(&self) -> Option<EntityKey> {
        self.metadata.entity_key()
    }

    /// Clamp and apply a progress update. No-op once terminal.
    pub fn apply_progress(&mut self, percent: u8, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.percent_complete = percent.min(100);
        self.message = message.into();
    }

    /// Transition to a terminal state, clearing runtime handles.
    pub fn complete(&mut self, success: bool, error: Option<String>, now: SystemTime) {
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.cancelled {
            OperationStatus::Cancelled
        } else if success {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        self.success = success && !self.cancelled;
        self.error = error;
        self.completed_at = Some(now);
        self.handles = OperationHandles::default();
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
