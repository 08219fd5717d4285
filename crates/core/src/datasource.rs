// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Datasource` record: one configured lancache instance this server
//! operates on (spec §3, §4.B).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named (cache path, log path) pair, immutable for the life of a run;
/// permissions are revalidated periodically by the Datasource Registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasource {
    pub name: String,
    pub cache_path: PathBuf,
    pub log_path: PathBuf,
    pub enabled: bool,
    pub cache_writable: bool,
    pub logs_writable: bool,
}

impl Datasource {
    pub fn new(name: impl Into<String>, cache_path: PathBuf, log_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            cache_path,
            log_path,
            enabled: true,
            cache_writable: false,
            logs_writable: false,
        }
    }

    /// Path to the proxy's access log for this datasource.
    pub fn access_log_path(&self) -> PathBuf {
        self.log_path.join("access.log")
    }

    pub fn is_usable_for_cache_write(&self) -> bool {
        self.enabled && self.cache_writable
    }

    pub fn is_usable_for_log_write(&self) -> bool {
        self.enabled && self.logs_writable
    }
}
