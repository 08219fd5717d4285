// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("malformed state record at {key}: {source}")]
    Malformed { key: String, #[source] source: serde_json::Error },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<StorageError> for lancache_core::CoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io { path, source } => {
                lancache_core::CoreError::TransientIo(format!("{path}: {source}"))
            }
            other => lancache_core::CoreError::Unknown(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
