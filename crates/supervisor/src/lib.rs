// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lancache-supervisor: the Native Worker Supervisor (spec §4.E) and the
//! Path Resolver (spec §4.A), plus the container engine `SPEC_FULL.md`
//! adds for prefill sessions (spec §4.M).
//!
//! `lancache-engine` and `lancache-prefill` both depend on this crate for
//! "run a helper process and read its progress" and "drive a container",
//! respectively; this crate itself never touches the operation registry or
//! the database.

pub mod container;
pub mod error;
pub mod paths;
pub mod process;
pub mod progress;
pub mod stats_parse;

pub use container::{
    BindMount, ContainerEngine, ContainerSpec, ContainerStatus, DockerCliEngine, NetworkMode,
    PortBinding,
};
pub use error::{Result, SupervisorError};
pub use paths::PathResolver;
pub use process::{ExecuteResult, NativeWorkerSupervisor, ProcessHandle, CANCELLED_EXIT_CODE};
pub use progress::{poll_progress, read_progress_file, DEFAULT_POLL_INTERVAL};
pub use stats_parse::parse_removal_stats;
