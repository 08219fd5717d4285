// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A process-wide pause flag the Live Log Monitor (§4.K) honors and
//! removal flows (§4.J) hold while they mutate a log file out from under
//! the monitor's incremental tail.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct PauseGate {
    paused: AtomicBool,
}

/// RAII guard returned by [`PauseGate::acquire`]; resumes on drop so a
/// panicking critical section still releases the gate.
pub struct PauseGuard<'a> {
    gate: &'a PauseGate,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.gate.paused.store(false, Ordering::SeqCst);
    }
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gate and returns a guard that clears it on drop.
    pub fn acquire(&self) -> PauseGuard<'_> {
        self.paused.store(true, Ordering::SeqCst);
        PauseGuard { gate: self }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "pause_gate_tests.rs"]
mod tests;
