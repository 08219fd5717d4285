// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;
use tempfile::tempdir;

#[test]
fn validate_binary_exists_rejects_missing_path() {
    let sup = NativeWorkerSupervisor::new();
    let err = sup
        .validate_binary_exists(Path::new("/definitely/not/a/real/binary"), "cache-cleaner")
        .unwrap_err();
    assert!(matches!(err, SupervisorError::BinaryMissing { .. }));
}

#[test]
fn validate_binary_exists_accepts_real_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("helper");
    std::fs::write(&path, b"#!/bin/sh\n").unwrap();
    let sup = NativeWorkerSupervisor::new();
    sup.validate_binary_exists(&path, "helper").unwrap();
}

#[tokio::test]
async fn execute_process_captures_stdout_and_exit_code() {
    let sup = NativeWorkerSupervisor::new();
    let (child, handle) = sup
        .spawn(
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo hello; exit 3".to_string()],
            None,
            &HashMap::new(),
        )
        .unwrap();
    let cancel = CancellationToken::new();
    let result = sup.execute_process(child, &handle, &cancel).await.unwrap();
    assert_eq!(result.exit_code, 3);
    assert_eq!(String::from_utf8_lossy(&result.stdout).trim(), "hello");
    assert!(!result.was_cancelled());
}

#[tokio::test]
async fn execute_process_reports_cancelled_exit_code_on_cancel() {
    let sup = NativeWorkerSupervisor::new();
    let (child, handle) = sup
        .spawn(Path::new("/bin/sh"), &["-c".to_string(), "sleep 30".to_string()], None, &HashMap::new())
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = sup.execute_process(child, &handle, &cancel).await.unwrap();
    assert_eq!(result.exit_code, CANCELLED_EXIT_CODE);
    assert!(result.was_cancelled());
}

#[tokio::test]
async fn delete_temporary_file_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("progress.json");
    tokio::fs::write(&path, b"{}").await.unwrap();
    let sup = NativeWorkerSupervisor::new();
    sup.delete_temporary_file(&path).await;
    assert!(!path.exists());
    // second call on an already-gone file must not hang or panic
    sup.delete_temporary_file(&path).await;
}

#[tokio::test]
async fn write_atomic_leaves_no_tmp_file_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.json");
    write_atomic(&path, b"{\"ok\":true}").await.unwrap();
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"{\"ok\":true}");
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn kill_tree_is_safe_to_call_twice() {
    let handle = ProcessHandle::new(i32::MAX);
    handle.kill_tree();
    handle.kill_tree();
}
