// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lancache-protocol: wire shapes for the two external boundaries the core
//! depends on bit-exactly (spec §6) — the native worker CLI progress/output
//! JSON contracts, and the prefill daemon's request/response/event protocol.
//!
//! Neither boundary is implemented here; this crate only defines the DTOs so
//! `lancache-supervisor` (which spawns the workers) and `lancache-prefill`
//! (which speaks to the daemon) share one parsed shape.

pub mod daemon;
pub mod worker;

pub use daemon::{
    Challenge, ChallengeResponse, Command, CredentialType, DaemonEvent, DaemonRequest,
    DaemonResponse, DepotProgress, PrefillProgressUpdate,
};
pub use worker::{
    CacheCleanerProgress, CorruptionChunk, CorruptionDetectOutput, CorruptionProgress,
    CorruptionSummary, DeleteMode, GameDetectorGame, GameDetectorOutput, GameDetectorService,
    LogManagerProgress, RemovalProgress, RemoverOutput, ServiceRemovalStats, WorkerProgress,
};
