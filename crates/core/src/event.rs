// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification Bus event shapes (spec §4.D, §6).
//!
//! Event names are stable string tags observable by the UI; payloads are
//! structured records. The bus itself (fan-out, coalescing, drop policy)
//! lives in `lancache-engine::notify`.

use crate::operation::OperationId;
use serde::{Deserialize, Serialize};

/// A notification fanned out to all subscribers. `name()` gives the stable
/// tag used on the wire; `payload` carries the structured body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum NotificationEvent {
    GameDetectionStarted { operation_id: OperationId },
    GameDetectionProgress { operation_id: OperationId, percent_complete: u8, message: String },
    GameDetectionComplete { operation_id: OperationId, payload: NotificationPayload },

    CacheClearingStarted { operation_id: OperationId },
    CacheClearingProgress { operation_id: OperationId, percent_complete: u8, message: String },
    CacheClearingComplete { operation_id: OperationId, payload: NotificationPayload },

    CorruptionDetectionStarted { operation_id: OperationId },
    CorruptionDetectionProgress { operation_id: OperationId, percent_complete: u8, message: String },
    CorruptionDetectionComplete { operation_id: OperationId, payload: NotificationPayload },

    GameRemovalStarted { operation_id: OperationId },
    GameRemovalProgress { operation_id: OperationId, percent_complete: u8, message: String },
    GameRemovalComplete { operation_id: OperationId, payload: NotificationPayload },

    ServiceRemovalStarted { operation_id: OperationId },
    ServiceRemovalProgress { operation_id: OperationId, percent_complete: u8, message: String },
    ServiceRemovalComplete { operation_id: OperationId, payload: NotificationPayload },

    LogProcessingStarted { operation_id: OperationId, datasource: String },
    LogProcessingProgress { operation_id: OperationId, datasource: String, lines_processed: u64 },
    LogProcessingComplete { operation_id: OperationId, datasource: String, payload: NotificationPayload },

    DaemonSessionCreated { session_id: String },
    DaemonSessionUpdated { session_id: String },
    DaemonSessionTerminated { session_id: String, reason: String },

    AuthStateChanged { session_id: String, state: String },
    CredentialChallenge { session_id: String, challenge_id: String, credential_type: String },
    StatusChanged { session_id: String, status: String },

    PrefillStateChanged { session_id: String, state: String },
    PrefillProgress { session_id: String, payload: NotificationPayload },
    PrefillHistoryUpdated { session_id: String, app_id: u32 },
    SessionEnded { session_id: String, reason: String },

    DirectoryPermissionsChanged { datasource: String },
    DownloadsRefresh,
}

impl NotificationEvent {
    /// The stable string tag this event serializes under (see spec §6).
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameDetectionStarted { .. } => "GameDetectionStarted",
            Self::GameDetectionProgress { .. } => "GameDetectionProgress",
            Self::GameDetectionComplete { .. } => "GameDetectionComplete",
            Self::CacheClearingStarted { .. } => "CacheClearingStarted",
            Self::CacheClearingProgress { .. } => "CacheClearingProgress",
            Self::CacheClearingComplete { .. } => "CacheClearingComplete",
            Self::CorruptionDetectionStarted { .. } => "CorruptionDetectionStarted",
            Self::CorruptionDetectionProgress { .. } => "CorruptionDetectionProgress",
            Self::CorruptionDetectionComplete { .. } => "CorruptionDetectionComplete",
            Self::GameRemovalStarted { .. } => "GameRemovalStarted",
            Self::GameRemovalProgress { .. } => "GameRemovalProgress",
            Self::GameRemovalComplete { .. } => "GameRemovalComplete",
            Self::ServiceRemovalStarted { .. } => "ServiceRemovalStarted",
            Self::ServiceRemovalProgress { .. } => "ServiceRemovalProgress",
            Self::ServiceRemovalComplete { .. } => "ServiceRemovalComplete",
            Self::LogProcessingStarted { .. } => "LogProcessingStarted",
            Self::LogProcessingProgress { .. } => "LogProcessingProgress",
            Self::LogProcessingComplete { .. } => "LogProcessingComplete",
            Self::DaemonSessionCreated { .. } => "DaemonSessionCreated",
            Self::DaemonSessionUpdated { .. } => "DaemonSessionUpdated",
            Self::DaemonSessionTerminated { .. } => "DaemonSessionTerminated",
            Self::AuthStateChanged { .. } => "AuthStateChanged",
            Self::CredentialChallenge { .. } => "CredentialChallenge",
            Self::StatusChanged { .. } => "StatusChanged",
            Self::PrefillStateChanged { .. } => "PrefillStateChanged",
            Self::PrefillProgress { .. } => "PrefillProgress",
            Self::PrefillHistoryUpdated { .. } => "PrefillHistoryUpdated",
            Self::SessionEnded { .. } => "SessionEnded",
            Self::DirectoryPermissionsChanged { .. } => "DirectoryPermissionsChanged",
            Self::DownloadsRefresh => "DownloadsRefresh",
        }
    }

    /// True for terminal-operation events; the bus guarantees no later event
    /// for the same operation id follows one of these (spec §5).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::GameDetectionComplete { .. }
                | Self::CacheClearingComplete { .. }
                | Self::CorruptionDetectionComplete { .. }
                | Self::GameRemovalComplete { .. }
                | Self::ServiceRemovalComplete { .. }
                | Self::LogProcessingComplete { .. }
        )
    }
}

/// Free-form aggregate payload shared by the `*Complete` / progress events.
/// Each producer fills in the fields relevant to it and leaves the rest at
/// their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationPayload(pub serde_json::Value);

impl NotificationPayload {
    pub fn from_value(v: serde_json::Value) -> Self {
        Self(v)
    }
}
