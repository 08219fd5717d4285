// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn exit_code_zero_is_not_an_error() {
    assert!(CoreError::from_exit_code(0, "").is_none());
}

#[test]
fn exit_code_137_is_not_an_error() {
    assert!(CoreError::from_exit_code(137, "killed").is_none());
}

#[test]
fn other_nonzero_exit_code_is_worker_failed() {
    let err = CoreError::from_exit_code(1, "boom").expect("should be an error");
    match err {
        CoreError::WorkerFailed { exit_code, message } => {
            assert_eq!(exit_code, 1);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn permission_denied_message_carries_remediation_hint() {
    let err = CoreError::PermissionDenied("/cache/a".into());
    assert!(err.to_string().contains("PUID/PGID"));
    assert!(err.is_permission_denied());
}
