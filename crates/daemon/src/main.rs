// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lancache-daemon`: process entrypoint for the operation & orchestration
//! plane (spec §2). Wires every process-wide singleton explicitly (spec §9:
//! "reject module-load-time side effects"), reconciles interrupted state
//! left over from a previous run, then drives the background loops that
//! don't depend on an inbound request: permission reprobing (§4.B), the
//! live log monitor (§4.K), and the depot mapping backfill (§4.L).
//!
//! The HTTP/WebSocket surface, the JSON config loader that produces the file
//! this binary reads, and SQLite migrations are out of scope (spec §1) —
//! this binary only assembles and runs the core.

mod config;
mod reconcile;
mod wiring;

use config::Config;
use lancache_storage::Db;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::var("LANCACHE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/config/lancache-manager.json"));

    let config = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, path = %config_path.display(), "failed to load config, falling back to defaults");
            Config::default()
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.data_root) {
        error!(error = %e, path = %config.data_root.display(), "failed to create data root");
    }
    if let Err(e) = std::fs::create_dir_all(config.data_root.join("operations")) {
        error!(error = %e, "failed to create operations directory");
    }

    let db = match Db::open(&config.data_root.join("lancache.db")).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "failed to open database, exiting");
            std::process::exit(1);
        }
    };

    let services = wiring::build(&config, db).await;

    reconcile::run(&services).await;

    let cancel = CancellationToken::new();
    lancache_engine::spawn_reprobe_loop(services.registry.clone(), services.bus.clone(), cancel.clone());
    lancache_logmon::spawn_monitor_loop(services.log_monitor.clone(), services.registry.clone(), cancel.clone());
    lancache_engine::spawn_backfill_loop(services.depot_backfill.clone(), cancel.clone());

    info!("lancache-daemon core wired and background loops started");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    cancel.cancel();
    services.prefill.shutdown_all().await;
}
