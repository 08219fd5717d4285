// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tolerant progress-file polling (spec §4.E): native workers write their
//! progress as JSON to a file on a fixed cadence; the supervisor tails that
//! file while the process runs. A worker rewriting the file mid-read is
//! expected, not an error, so a read that fails to parse is treated as "no
//! update yet" rather than propagated.

use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default interval between progress-file polls while a worker runs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Reads and parses `path` as JSON, returning `None` if the file doesn't
/// exist yet or is mid-write (truncated/invalid JSON). Never returns an
/// error for those cases; only a genuine filesystem error below is
/// propagated by the caller choosing to log it.
pub async fn read_progress_file<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "progress file read failed");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            trace!(path = %path.display(), error = %e, "progress file parse failed, likely mid-write");
            None
        }
    }
}

/// Polls `path` every `interval` until `cancel` fires, invoking `on_update`
/// with each successfully parsed value. Intended to run in its own
/// `tokio::spawn`ed task alongside `execute_process`.
pub async fn poll_progress<T, F>(
    path: &Path,
    interval: Duration,
    cancel: &CancellationToken,
    mut on_update: F,
) where
    T: DeserializeOwned,
    F: FnMut(T),
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                if let Some(value) = read_progress_file::<T>(path).await {
                    on_update(value);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
