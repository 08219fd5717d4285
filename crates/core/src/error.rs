// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the operation and orchestration plane.
//!
//! Every subsystem (supervisor, engine, log monitor, prefill manager) maps
//! its failures onto this taxonomy before surfacing them to the Unified
//! Operation Tracker, so that callers polling an [`crate::Operation`] see a
//! consistent shape regardless of which component failed.

use thiserror::Error;

/// Taxonomy of failures surfaced by the operation plane (see spec §7).
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("permission denied: {0} (check PUID/PGID)")]
    PermissionDenied(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("worker failed (exit {exit_code}): {message}")]
    WorkerFailed { exit_code: i32, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("account banned: {0}")]
    Banned(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("worker crashed before producing output: {0}")]
    Crashed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CoreError {
    /// True for failure kinds that should never be retried silently and
    /// must be surfaced to the caller with a remediation hint.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CoreError::PermissionDenied(_))
    }

    /// Maps a native worker's exit status onto the taxonomy.
    ///
    /// Exit code 137 is reserved by the supervisor for "killed after
    /// cancellation" and must never be reported as a failure.
    pub fn from_exit_code(exit_code: i32, stderr_tail: impl Into<String>) -> Option<Self> {
        match exit_code {
            0 => None,
            137 => None,
            other => Some(CoreError::WorkerFailed { exit_code: other, message: stderr_tail.into() }),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
