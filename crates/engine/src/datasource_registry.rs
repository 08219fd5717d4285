// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Datasource Registry (spec §4.B): enumerates the configured datasources
//! at startup and periodically reprobes their (cache, log) writability,
//! publishing [`NotificationEvent::DirectoryPermissionsChanged`] on
//! transitions.

use crate::notify::NotificationBus;
use lancache_core::{Datasource, NotificationEvent};
use lancache_supervisor::PathResolver;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Reprobe cadence (spec §4.B: "≈30 s").
pub const REPROBE_INTERVAL: Duration = Duration::from_secs(30);

pub struct DatasourceRegistry {
    datasources: RwLock<Vec<Datasource>>,
    default_name: Option<String>,
}

impl DatasourceRegistry {
    pub fn new(mut datasources: Vec<Datasource>, default_name: Option<String>) -> Self {
        for ds in &mut datasources {
            ds.cache_writable = PathResolver::is_directory_writable(&ds.cache_path);
            ds.logs_writable = PathResolver::is_directory_writable(&ds.log_path);
        }
        Self { datasources: RwLock::new(datasources), default_name }
    }

    pub fn get_datasources(&self) -> Vec<Datasource> {
        self.datasources.read().clone()
    }

    pub fn get_default_datasource(&self) -> Option<Datasource> {
        let datasources = self.datasources.read();
        match &self.default_name {
            Some(name) => datasources.iter().find(|d| &d.name == name).cloned(),
            None => datasources.first().cloned(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Datasource> {
        self.datasources.read().iter().find(|d| d.name == name).cloned()
    }

    /// Reprobes every datasource's writability once, publishing a
    /// `DirectoryPermissionsChanged` event for each one whose
    /// cache-or-log writability actually flipped.
    pub fn reprobe_once(&self, bus: &NotificationBus) {
        let mut datasources = self.datasources.write();
        for ds in datasources.iter_mut() {
            let cache_writable = PathResolver::is_directory_writable(&ds.cache_path);
            let logs_writable = PathResolver::is_directory_writable(&ds.log_path);
            if cache_writable != ds.cache_writable || logs_writable != ds.logs_writable {
                info!(datasource = %ds.name, cache_writable, logs_writable, "permissions changed");
                ds.cache_writable = cache_writable;
                ds.logs_writable = logs_writable;
                bus.notify_all(NotificationEvent::DirectoryPermissionsChanged { datasource: ds.name.clone() });
            }
        }
    }
}

/// Spawns the background reprobe loop; runs until `cancel` fires.
pub fn spawn_reprobe_loop(
    registry: Arc<DatasourceRegistry>,
    bus: Arc<NotificationBus>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(REPROBE_INTERVAL) => {
                    registry.reprobe_once(&bus);
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "datasource_registry_tests.rs"]
mod tests;
