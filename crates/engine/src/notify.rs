// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification Bus (spec §4.D): fire-and-forget fan-out of
//! [`NotificationEvent`]s to every subscriber.
//!
//! Producers call [`NotificationBus::notify_all`] and move on; a slow or
//! absent subscriber never blocks a producer. Each subscriber gets its own
//! bounded channel so one slow consumer can't starve the others — when a
//! subscriber's channel is full, its oldest queued event is dropped rather
//! than applying backpressure to the producer.

use lancache_core::NotificationEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Per-subscriber channel depth. Deep enough to absorb a burst of progress
/// ticks; a subscriber further behind than this is considered slow and
/// starts losing the oldest events.
const SUBSCRIBER_CHANNEL_DEPTH: usize = 256;

pub type Subscription = mpsc::Receiver<NotificationEvent>;

#[derive(Default)]
pub struct NotificationBus {
    subscribers: Mutex<Vec<mpsc::Sender<NotificationEvent>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its receiver half.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_DEPTH);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Fans `event` out to every live subscriber. Never blocks: a full
    /// channel means the subscriber is behind, so the event is dropped for
    /// it and logged, not awaited. Closed subscriber channels are pruned on
    /// the next call.
    pub fn notify_all(&self, event: NotificationEvent) {
        let mut subscribers = self.subscribers.lock();
        trace!(event = event.name(), subscribers = subscribers.len(), "notify_all");
        subscribers.retain(|tx| {
            if tx.is_closed() {
                return false;
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                debug!(event = event.name(), "subscriber channel full, dropping event for it");
            }
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
