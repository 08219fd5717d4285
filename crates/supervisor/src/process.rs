// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process spawning and forceful termination (spec §4.E).
//!
//! Every helper is spawned in its own process group so that [`ProcessHandle::kill_tree`]
//! can take down any children it forked (e.g. `rsync`) with one `killpg`,
//! matching the spec's "terminates the process tree" contract.

use crate::error::{Result, SupervisorError};
use lancache_core::operation::KillableProcess;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Exit code the supervisor reserves for "killed after cancellation" (spec
/// §4.E, §5, §8). Never reported as a failure.
pub const CANCELLED_EXIT_CODE: i32 = 137;

/// The completed result of [`NativeWorkerSupervisor::execute_process`].
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecuteResult {
    /// True iff the worker was killed by the supervisor after a
    /// cancellation request, per spec §4.E/§5/§8.
    pub fn was_cancelled(&self) -> bool {
        self.exit_code == CANCELLED_EXIT_CODE
    }

    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let s = String::from_utf8_lossy(&self.stderr);
        if s.len() <= max_bytes {
            s.into_owned()
        } else {
            s[s.len() - max_bytes..].to_string()
        }
    }
}

/// A handle to a spawned helper process. Implements [`KillableProcess`] so an
/// `Operation` in `lancache-core` can force-kill it without `lancache-core`
/// depending on this crate.
pub struct ProcessHandle {
    pid: i32,
    killed: AtomicBool,
}

impl ProcessHandle {
    fn new(pid: i32) -> Self {
        Self { pid, killed: AtomicBool::new(false) }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }
}

impl KillableProcess for ProcessHandle {
    fn kill_tree(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Negative pid targets the whole process group (spec §4.E "terminates
        // the process tree"). Best-effort: ESRCH means it already exited.
        let _ = signal::kill(Pid::from_raw(-self.pid), Signal::SIGKILL);
    }
}

/// Spawns CPU-bound helper executables and polls their progress files (spec
/// §4.E). One instance is shared process-wide.
#[derive(Default)]
pub struct NativeWorkerSupervisor {
    /// Tracks PIDs of children we've spawned so `DeleteTemporaryFile`-style
    /// cleanup routines can cross-check "is this still running" in tests.
    children: Mutex<HashMap<i32, ()>>,
}

impl NativeWorkerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a helper binary exists before spawning it, failing fast
    /// with a structured `ConfigError` per spec §4.E.
    pub fn validate_binary_exists(&self, path: &Path, name: &str) -> Result<()> {
        if !path.is_file() {
            return Err(SupervisorError::BinaryMissing {
                name: name.to_string(),
                path: path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Spawns `binary_path args...` in a fresh process group, piping
    /// stdout/stderr, and returns a live [`Child`] plus a [`ProcessHandle`]
    /// for cancellation.
    pub fn spawn(
        &self,
        binary_path: &Path,
        args: &[String],
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<(Child, std::sync::Arc<ProcessHandle>)> {
        let mut cmd = Command::new(binary_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in env {
            cmd.env(k, v);
        }
        // New process group: pgid == pid, so `kill_tree` can killpg it.
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
            binary: binary_path.display().to_string(),
            source: e.to_string(),
        })?;
        let pid = child.id().ok_or_else(|| SupervisorError::Spawn {
            binary: binary_path.display().to_string(),
            source: "child exited before pid could be read".into(),
        })? as i32;

        self.children.lock().unwrap_or_else(|e| e.into_inner()).insert(pid, ());
        Ok((child, std::sync::Arc::new(ProcessHandle::new(pid))))
    }

    /// Awaits completion of a spawned child, honoring cooperative
    /// cancellation: on cancel, stdio reads stop and the process tree is
    /// killed, with the result's exit code forced to
    /// [`CANCELLED_EXIT_CODE`] (spec §4.E).
    pub async fn execute_process(
        &self,
        mut child: Child,
        handle: &ProcessHandle,
        cancel: &CancellationToken,
    ) -> Result<ExecuteResult> {
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stdout_pipe.take() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr_pipe.take() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                handle.kill_tree();
                let _ = child.wait().await;
                Ok(ExecuteResult { exit_code: CANCELLED_EXIT_CODE, stdout: Vec::new(), stderr: Vec::new() })
            }
            (status, stdout, stderr) = async {
                let (stdout, stderr) = tokio::join!(read_stdout, read_stderr);
                let status = child.wait().await;
                (status, stdout, stderr)
            } => {
                let status = status?;
                let exit_code = status.code().unwrap_or(-1);
                Ok(ExecuteResult { exit_code, stdout, stderr })
            }
        }
    }

    /// Best-effort cleanup of a worker's progress/output JSON file. Swallows
    /// "already removed" (spec §4.E).
    pub async fn delete_temporary_file(&self, path: &Path) {
        for _ in 0..3 {
            match tokio::fs::remove_file(path).await {
                Ok(()) => return,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
            }
        }
    }
}

/// Writes `content` to `path` via a temp-file-then-rename so readers never
/// observe a partial write. Mirrors the contract the helpers themselves
/// implement for their progress files; used by our own tests and by
/// `lancache-prefill`'s session materialization.
pub async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = tokio::fs::File::create(&tmp).await?;
        f.write_all(content).await?;
        f.flush().await?;
    }
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
