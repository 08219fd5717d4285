// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lancache_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] lancache_storage::StorageError),

    #[error(transparent)]
    Supervisor(#[from] lancache_supervisor::SupervisorError),
}

impl From<EngineError> for CoreError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Core(c) => c,
            EngineError::Storage(s) => CoreError::TransientIo(s.to_string()),
            EngineError::Supervisor(s) => s.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
