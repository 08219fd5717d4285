// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lancache_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefillError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] lancache_storage::StorageError),

    #[error(transparent)]
    Supervisor(#[from] lancache_supervisor::SupervisorError),

    #[error("daemon transport error: {0}")]
    Transport(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("credential encryption error: {0}")]
    Crypto(String),

    #[error("account banned: {0}")]
    Banned(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl From<PrefillError> for CoreError {
    fn from(e: PrefillError) -> Self {
        match e {
            PrefillError::Core(c) => c,
            PrefillError::Storage(s) => s.into(),
            PrefillError::Supervisor(s) => s.into(),
            PrefillError::Transport(msg) => CoreError::TransientIo(msg),
            PrefillError::Protocol(msg) => CoreError::Protocol(msg),
            PrefillError::Crypto(msg) => CoreError::Unknown(msg),
            PrefillError::Banned(msg) => CoreError::Banned(msg),
            PrefillError::Timeout(msg) => CoreError::Timeout(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, PrefillError>;
