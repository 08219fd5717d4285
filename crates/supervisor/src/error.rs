// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lancache_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SupervisorError {
    #[error("helper binary not found: {name} at {path}")]
    BinaryMissing { name: String, path: String },

    #[error("failed to spawn {binary}: {source}")]
    Spawn { binary: String, source: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("worker exited with code {exit_code}: {stderr_tail}")]
    WorkerFailed { exit_code: i32, stderr_tail: String },

    #[error("worker crashed before producing output: {0}")]
    Crashed(String),

    #[error("container engine error: {0}")]
    Container(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for SupervisorError {
    fn from(e: std::io::Error) -> Self {
        SupervisorError::Io(e.to_string())
    }
}

impl From<SupervisorError> for CoreError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::BinaryMissing { name, path } => {
                CoreError::Config(format!("missing helper binary '{name}' at {path}"))
            }
            SupervisorError::Spawn { binary, source } => {
                CoreError::Config(format!("failed to spawn {binary}: {source}"))
            }
            SupervisorError::Io(msg) => CoreError::TransientIo(msg),
            SupervisorError::WorkerFailed { exit_code, stderr_tail } => {
                CoreError::WorkerFailed { exit_code, message: stderr_tail }
            }
            SupervisorError::Crashed(msg) => CoreError::Crashed(msg),
            SupervisorError::Container(msg) => CoreError::Unknown(msg),
            SupervisorError::Cancelled => CoreError::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
