// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use lancache_storage::{Db, Download, SteamDepotMapping};

async fn backfill() -> (DepotMappingBackfill, Arc<DownloadStore>, Arc<DepotMappingStore>) {
    let db = Db::in_memory().await.unwrap();
    let downloads = Arc::new(DownloadStore::new(db.clone()));
    let depot_mappings = Arc::new(DepotMappingStore::new(db));
    let bus = Arc::new(NotificationBus::new());
    let svc = DepotMappingBackfill::new(
        downloads.clone(),
        depot_mappings.clone(),
        bus,
        Arc::new(NoopGameMetadataLookup),
    );
    (svc, downloads, depot_mappings)
}

fn download(id: &str, depot_id: i64) -> Download {
    Download {
        id: id.to_string(),
        service: "steam".to_string(),
        depot_id: Some(depot_id),
        game_app_id: None,
        game_name: None,
        game_image_url: None,
        start_time_utc: Utc::now(),
    }
}

#[tokio::test]
async fn run_once_is_a_noop_when_nothing_is_unresolved() {
    let (svc, _downloads, _mappings) = backfill().await;
    assert_eq!(svc.run_once().await.unwrap(), 0);
    assert_eq!(svc.next_interval(), BASE_INTERVAL);
}

#[tokio::test]
async fn run_once_resolves_via_owner_mapping_and_falls_back_to_app_name() {
    let (svc, downloads, mappings) = backfill().await;
    downloads.insert(&download("dl-1", 12345)).await.unwrap();
    mappings
        .upsert(&SteamDepotMapping {
            depot_id: 12345,
            app_id: 730,
            app_name: Some("Counter-Strike".to_string()),
            is_owner: true,
            source: "test".to_string(),
            discovered_at: Utc::now(),
        })
        .await
        .unwrap();

    let resolved = svc.run_once().await.unwrap();
    assert_eq!(resolved, 1);

    let remaining = downloads.unresolved_steam_downloads(BACKFILL_BATCH_SIZE).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn run_once_synthesizes_a_name_when_the_mapping_has_none() {
    let (svc, downloads, mappings) = backfill().await;
    downloads.insert(&download("dl-1", 999)).await.unwrap();
    mappings
        .upsert(&SteamDepotMapping {
            depot_id: 999,
            app_id: 42,
            app_name: None,
            is_owner: true,
            source: "test".to_string(),
            discovered_at: Utc::now(),
        })
        .await
        .unwrap();

    assert_eq!(svc.run_once().await.unwrap(), 1);
}

#[tokio::test]
async fn unresolvable_downloads_count_as_an_empty_run() {
    let (svc, downloads, _mappings) = backfill().await;
    downloads.insert(&download("dl-1", 111)).await.unwrap();

    assert_eq!(svc.run_once().await.unwrap(), 0);
    assert_eq!(svc.consecutive_empty_runs.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn five_consecutive_empty_runs_slow_the_cadence() {
    let (svc, _downloads, _mappings) = backfill().await;
    for _ in 0..5 {
        assert_eq!(svc.run_once().await.unwrap(), 0);
    }
    assert_eq!(svc.next_interval(), SLOW_INTERVAL);
}
