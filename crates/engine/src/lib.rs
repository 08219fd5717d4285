// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lancache-engine: the operation and orchestration plane's process-wide
//! services (spec §4.B, §4.D, §4.F) and the four native-worker-backed job
//! flows built on top of them (spec §4.G–§4.J), plus the depot mapping
//! backfill (spec §4.L).
//!
//! Everything here is constructed explicitly by `lancache-daemon` at
//! startup and passed by reference into whatever needs it (spec §9: "reject
//! module-load-time side effects") — there are no process-wide statics.

pub mod cache_clearing;
pub mod corruption_detection;
pub mod datasource_registry;
pub mod depot_backfill;
pub mod error;
pub mod game_detection;
pub mod notify;
pub mod pause_gate;
pub mod removal;
pub mod uot;

pub use cache_clearing::{CacheClearResult, CacheClearingService};
pub use corruption_detection::CorruptionDetectionService;
pub use datasource_registry::{spawn_reprobe_loop, DatasourceRegistry, REPROBE_INTERVAL};
pub use depot_backfill::{spawn_backfill_loop, DepotMappingBackfill, GameMetadataLookup, NoopGameMetadataLookup};
pub use error::{EngineError, Result};
pub use game_detection::GameCacheDetectionService;
pub use notify::{NotificationBus, Subscription};
pub use pause_gate::{PauseGate, PauseGuard};
pub use removal::{GameRemovalResult, LogReopenSignal, NoopLogReopenSignal, RemovalService, ServiceRemovalResult};
pub use uot::{schedule_eviction, UnifiedOperationTracker, EVICTION_GRACE};
