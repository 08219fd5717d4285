// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogMonError {
    #[error(transparent)]
    Storage(#[from] lancache_storage::StorageError),

    #[error(transparent)]
    Supervisor(#[from] lancache_supervisor::SupervisorError),
}

pub type Result<T> = std::result::Result<T, LogMonError>;
