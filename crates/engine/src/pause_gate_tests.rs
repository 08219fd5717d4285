// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn starts_unpaused() {
    let gate = PauseGate::new();
    assert!(!gate.is_paused());
}

#[test]
fn acquire_pauses_until_guard_drops() {
    let gate = PauseGate::new();
    {
        let _guard = gate.acquire();
        assert!(gate.is_paused());
    }
    assert!(!gate.is_paused());
}

#[test]
fn guard_releases_even_if_caller_does_not_explicitly_drop() {
    let gate = PauseGate::new();
    fn hold(gate: &PauseGate) {
        let _guard = gate.acquire();
    }
    hold(&gate);
    assert!(!gate.is_paused());
}
