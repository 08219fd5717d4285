// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lancache-logmon: the Live Log Monitor (spec §4.K) — incremental tailing
//! of each datasource's access log, with a pause gate honored by removal
//! flows and exponential backoff on permission errors.

pub mod error;
pub mod monitor;

pub use error::{LogMonError, Result};
pub use monitor::{spawn_monitor_loop, LiveLogMonitor, GROWTH_THRESHOLD_BYTES, LOOP_INTERVAL};
