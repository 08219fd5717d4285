// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lancache_core::operation::OperationId;

#[tokio::test]
async fn subscriber_receives_notified_event() {
    let bus = NotificationBus::new();
    let mut sub = bus.subscribe();
    bus.notify_all(NotificationEvent::DownloadsRefresh);
    let event = sub.recv().await.unwrap();
    assert_eq!(event.name(), "DownloadsRefresh");
}

#[tokio::test]
async fn event_fans_out_to_all_subscribers() {
    let bus = NotificationBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();
    bus.notify_all(NotificationEvent::GameDetectionStarted { operation_id: OperationId::new() });
    assert_eq!(a.recv().await.unwrap().name(), "GameDetectionStarted");
    assert_eq!(b.recv().await.unwrap().name(), "GameDetectionStarted");
}

#[test]
fn notify_all_never_blocks_with_no_subscribers() {
    let bus = NotificationBus::new();
    bus.notify_all(NotificationEvent::DownloadsRefresh);
}

#[tokio::test]
async fn dropped_receiver_is_pruned_on_next_notify() {
    let bus = NotificationBus::new();
    let sub = bus.subscribe();
    drop(sub);
    assert_eq!(bus.subscriber_count(), 1);
    bus.notify_all(NotificationEvent::DownloadsRefresh);
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn full_subscriber_channel_drops_event_without_blocking_producer() {
    let bus = NotificationBus::new();
    let mut sub = bus.subscribe();
    for _ in 0..(SUBSCRIBER_CHANNEL_DEPTH + 10) {
        bus.notify_all(NotificationEvent::DownloadsRefresh);
    }
    // producer never blocked; subscriber can still drain what fit
    let mut drained = 0;
    while sub.try_recv().is_ok() {
        drained += 1;
    }
    assert!(drained > 0);
    assert!(drained <= SUBSCRIBER_CHANNEL_DEPTH);
}
