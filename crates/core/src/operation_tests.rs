// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn op() -> Operation {
    Operation::new(
        OperationType::CacheClearing,
        "clear all",
        CancellationToken::new(),
        OperationMetadata::empty(),
        SystemTime::now(),
    )
}

#[test]
fn new_operation_starts_running_at_zero_percent() {
    let o = op();
    assert_eq!(o.status, OperationStatus::Running);
    assert_eq!(o.percent_complete, 0);
    assert!(!o.status.is_terminal());
}

#[test]
fn progress_clamps_to_100() {
    let mut o = op();
    o.apply_progress(150, "almost done");
    assert_eq!(o.percent_complete, 100);
    assert_eq!(o.message, "almost done");
}

#[test]
fn complete_is_sticky_for_terminal_operations() {
    let mut o = op();
    let t1 = SystemTime::now();
    o.complete(true, None, t1);
    assert_eq!(o.status, OperationStatus::Completed);
    assert!(o.success);

    // A later completion attempt (e.g. a race between cancel and finish) is a no-op.
    let t2 = t1 + Duration::from_secs(5);
    o.complete(false, Some("too late".into()), t2);
    assert_eq!(o.status, OperationStatus::Completed);
    assert!(o.success);
    assert_eq!(o.completed_at, Some(t1));
}

#[test]
fn progress_after_terminal_is_ignored() {
    let mut o = op();
    o.complete(true, None, SystemTime::now());
    o.apply_progress(42, "should not apply");
    assert_eq!(o.percent_complete, 0);
}

#[test]
fn cancelled_completion_reports_cancelled_status_and_not_success() {
    let mut o = op();
    o.cancelled = true;
    o.complete(true, None, SystemTime::now());
    assert_eq!(o.status, OperationStatus::Cancelled);
    assert!(!o.success);
}

#[test]
fn complete_clears_runtime_handles() {
    let mut o = op();
    assert!(o.handles.cancel.is_some());
    o.complete(false, Some("boom".into()), SystemTime::now());
    assert!(o.handles.cancel.is_none());
    assert!(o.handles.worker_process.is_none());
}

#[test]
fn entity_key_round_trips_through_metadata() {
    let mut meta = OperationMetadata::empty();
    meta.set("entity_key", "49520");
    let o = Operation::new(
        OperationType::GameRemoval,
        "remove 49520",
        CancellationToken::new(),
        meta,
        SystemTime::now(),
    );
    assert_eq!(o.entity_key(), Some(EntityKey::new("49520")));
}
