// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation (spec §4.C, §4.M "orphan reconciliation"): marks
//! operation-state records that were still `running` when the process died
//! as interrupted, and hands off to the prefill manager's own orphan
//! container sweep.

use crate::wiring::Services;
use lancache_storage::DEFAULT_RUNNING_CUTOFF_SECS;
use tracing::{info, warn};

/// Reinterprets stale `running` operation-state records as `Failed` with
/// "Operation interrupted by service restart" (spec §4.G) and sweeps
/// orphaned prefill containers (spec §4.M). Best-effort: a failure in one
/// part of reconciliation doesn't block daemon startup.
pub async fn run(services: &Services) {
    match reconcile_interrupted_operations(services).await {
        Ok(n) if n > 0 => info!(count = n, "reinterpreted interrupted operations on startup"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to reconcile interrupted operations"),
    }

    if let Err(e) = services.prefill.reconcile_orphans().await {
        warn!(error = %e, "failed to reconcile orphaned prefill sessions");
    }
}

async fn reconcile_interrupted_operations(services: &Services) -> lancache_storage::Result<usize> {
    let stale = services.state_store.find_stale_running(DEFAULT_RUNNING_CUTOFF_SECS).await?;
    let count = stale.len();
    for mut record in stale {
        record.status = "failed".to_string();
        record.message = "Operation interrupted by service restart".to_string();
        services.state_store.save_state(&record).await?;
    }
    Ok(count)
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
