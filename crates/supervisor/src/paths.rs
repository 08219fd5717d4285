// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path Resolver (spec §4.A): resolves the handful of filesystem roots every
//! other component needs and probes writability without ever surfacing a
//! permission error as a panic or unhandled throw.

use std::path::{Path, PathBuf};

/// The filesystem layout every other component resolves paths from. Built
/// once at startup from configuration and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct PathResolver {
    data_root: PathBuf,
    operations_dir: PathBuf,
    db_path: PathBuf,
    helper_bin_dir: PathBuf,
}

impl PathResolver {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            operations_dir: data_root.join("operations"),
            db_path: data_root.join("lancache.db"),
            helper_bin_dir: data_root.join("bin"),
            data_root,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn operations_dir(&self) -> &Path {
        &self.operations_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Path to a progress/output file a native worker writes for one
    /// in-flight operation.
    pub fn operation_progress_file(&self, operation_id: &str) -> PathBuf {
        self.operations_dir.join(format!("{operation_id}.progress.json"))
    }

    /// Resolves the absolute path to a named helper binary (e.g.
    /// `cache-cleaner`, `corruption-detector`, `game-detector`,
    /// `service-remover`, `log-processor`).
    pub fn helper_binary(&self, name: &str) -> PathBuf {
        self.helper_bin_dir.join(name)
    }

    /// Probes writability by attempting a create+delete under `path`.
    /// Never panics on a permission error; any failure is simply "not
    /// writable" (spec §4.A).
    pub fn is_directory_writable(path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        let probe = path.join(format!(".lancache-write-probe-{}", std::process::id()));
        match std::fs::File::create(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
