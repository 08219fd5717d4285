// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process wiring: constructs every process-wide singleton and job-flow
//! service explicitly and passes them by reference into whatever needs
//! them (spec §9: "reject module-load-time side effects" — nothing here
//! is a `static`, everything is built once in [`build`] and handed out of
//! an owned [`Services`] bundle).

use crate::config::Config;
use lancache_core::Datasource;
use lancache_engine::{
    CacheClearingService, CorruptionDetectionService, DatasourceRegistry, DepotMappingBackfill,
    GameCacheDetectionService, NotificationBus, NoopGameMetadataLookup, PauseGate, RemovalService,
    UnifiedOperationTracker,
};
use lancache_logmon::LiveLogMonitor;
use lancache_prefill::PrefillSessionManager;
use lancache_storage::{
    BanStore, DepotMappingStore, DetectionStore, Db, DownloadStore, LogPositionStore,
    OperationStateStore, PrefillStore,
};
use lancache_supervisor::{DockerCliEngine, NativeWorkerSupervisor, PathResolver};
use std::sync::Arc;

/// Every long-lived service the daemon's background loops and (out-of-core)
/// request handlers depend on.
pub struct Services {
    pub paths: PathResolver,
    pub registry: Arc<DatasourceRegistry>,
    pub bus: Arc<NotificationBus>,
    pub pause_gate: Arc<PauseGate>,
    pub tracker: Arc<UnifiedOperationTracker>,
    pub supervisor: Arc<NativeWorkerSupervisor>,
    pub state_store: Arc<OperationStateStore>,
    pub detections: Arc<DetectionStore>,
    pub depot_mappings: Arc<DepotMappingStore>,
    pub downloads: Arc<DownloadStore>,
    pub bans: Arc<BanStore>,
    pub prefill_store: Arc<PrefillStore>,
    pub positions: Arc<LogPositionStore>,
    pub cache_clearing: CacheClearingService,
    pub corruption_detection: CorruptionDetectionService,
    pub game_detection: GameCacheDetectionService,
    pub removal: RemovalService,
    pub log_monitor: Arc<LiveLogMonitor>,
    pub depot_backfill: Arc<DepotMappingBackfill>,
    pub prefill: Arc<PrefillSessionManager>,
}

/// Builds every service from `config` and an already-open `db`. Splitting
/// this from [`Config::load`] keeps the wiring testable against an
/// in-memory database.
pub async fn build(config: &Config, db: Db) -> Services {
    let paths = PathResolver::new(&config.data_root);
    // `PathResolver` always resolves helpers under `<data_root>/bin`; an
    // explicit `helper_bin_dir` override bypasses that and is joined
    // directly, since the resolver itself has no override hook.
    let helper_bin_override = config.helper_bin_dir.clone();
    let helper_bin = |name: &str| -> std::path::PathBuf {
        match &helper_bin_override {
            Some(dir) => dir.join(name),
            None => paths.helper_binary(name),
        }
    };

    let datasources: Vec<Datasource> = config
        .datasources
        .iter()
        .map(|d| {
            let mut ds = Datasource::new(d.name.clone(), d.cache_path.clone(), d.log_path.clone());
            ds.enabled = d.enabled;
            ds
        })
        .collect();
    let registry = Arc::new(DatasourceRegistry::new(datasources, config.default_datasource.clone()));

    let bus = Arc::new(NotificationBus::new());
    let pause_gate = Arc::new(PauseGate::new());
    let tracker = Arc::new(UnifiedOperationTracker::new());
    let supervisor = Arc::new(NativeWorkerSupervisor::new());

    let state_store = Arc::new(OperationStateStore::new(db.clone()));
    let detections = Arc::new(DetectionStore::new(db.clone()));
    let depot_mappings = Arc::new(DepotMappingStore::new(db.clone()));
    let downloads = Arc::new(DownloadStore::new(db.clone()));
    let bans = Arc::new(BanStore::new(db.clone()));
    let prefill_store = Arc::new(PrefillStore::new(db.clone()));
    let positions = Arc::new(LogPositionStore::new(db.clone()));

    let cache_clearing = CacheClearingService::new(
        tracker.clone(),
        supervisor.clone(),
        bus.clone(),
        state_store.clone(),
        helper_bin("cache-cleaner"),
        paths.operations_dir().to_path_buf(),
    );

    let corruption_detection = CorruptionDetectionService::new(
        tracker.clone(),
        supervisor.clone(),
        bus.clone(),
        detections.clone(),
        helper_bin("corruption-manager"),
        paths.operations_dir().to_path_buf(),
    );

    let game_detection = GameCacheDetectionService::new(
        tracker.clone(),
        supervisor.clone(),
        bus.clone(),
        detections.clone(),
        depot_mappings.clone(),
        state_store.clone(),
        helper_bin("game-cache-detector"),
        paths.db_path().to_path_buf(),
        paths.operations_dir().to_path_buf(),
    );

    let removal = RemovalService::new(
        tracker.clone(),
        supervisor.clone(),
        bus.clone(),
        detections.clone(),
        pause_gate.clone(),
        Arc::new(lancache_engine::NoopLogReopenSignal),
        Arc::new(corruption_detection.clone()),
        helper_bin("game-cache-remover"),
        helper_bin("service-remover"),
        paths.db_path().to_path_buf(),
        paths.operations_dir().to_path_buf(),
    );

    let log_monitor = Arc::new(LiveLogMonitor::new(
        tracker.clone(),
        supervisor.clone(),
        bus.clone(),
        pause_gate.clone(),
        positions.clone(),
        helper_bin("log-processor"),
    ));

    let depot_backfill = Arc::new(DepotMappingBackfill::new(
        downloads.clone(),
        depot_mappings.clone(),
        bus.clone(),
        Arc::new(NoopGameMetadataLookup),
    ));

    let container_engine: Arc<dyn lancache_supervisor::ContainerEngine> =
        Arc::new(DockerCliEngine::new("docker"));
    let prefill = Arc::new(PrefillSessionManager::new(
        config.prefill.clone(),
        container_engine,
        prefill_store.clone(),
        bans.clone(),
        tracker.clone(),
        bus.clone(),
        Arc::new(lancache_prefill::NoopPrefillHooks),
        config.steam_probe_url.clone(),
        config.steam_probe_domains.clone(),
    ));

    Services {
        paths,
        registry,
        bus,
        pause_gate,
        tracker,
        supervisor,
        state_store,
        detections,
        depot_mappings,
        downloads,
        bans,
        prefill_store,
        positions,
        cache_clearing,
        corruption_detection,
        game_detection,
        removal,
        log_monitor,
        depot_backfill,
        prefill,
    }
}
