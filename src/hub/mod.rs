//! Broadcast hub for event fan-out
//!
//! The hub decouples event producers (one bridge task per session) from
//! event consumers (one [`Subscription`] per stream observer).
//!
//! # Architecture
//!
//! ```text
//!   [Session A bridge]   [Session B bridge]
//!          │                    │
//!          └──► hub.publish() ◄─┘
//!                    │
//!        snapshot subscribers (mutex held briefly)
//!                    │
//!      ┌─────────────┼─────────────┐
//!      ▼             ▼             ▼
//!   try_send      try_send      try_send      (never blocks)
//!      │             │             │
//!  [Subscription] [Subscription] [Subscription]
//!   recv().await   recv().await   recv().await
//! ```
//!
//! A failed delivery (queue closed, queue full, or subscriber cancelled)
//! removes that subscriber; other subscribers are unaffected and the failure
//! is never retried. A removed subscriber still receives the events queued
//! before its removal.
//!
//! # Ordering
//!
//! Each session publishes from a single task and every subscriber queue is
//! FIFO, so events of one session reach every subscriber in production
//! order. There is no ordering across sessions.

pub mod subscriber;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::Event;

pub use subscriber::{SubscriberId, Subscription};
use subscriber::Subscriber;

/// Default per-subscriber queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Current number of subscribers
    pub subscribers: usize,
    /// Events passed to `publish`
    pub published: u64,
    /// Successful per-subscriber deliveries
    pub delivered: u64,
    /// Subscribers removed after a failed delivery
    pub evicted: u64,
}

/// Process-wide event fan-out
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    published: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub with the default queue capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a hub whose subscribers buffer up to `queue_capacity` events
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let cancel = CancellationToken::new();

        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(
                id,
                Subscriber {
                    tx,
                    cancel: cancel.clone(),
                },
            );
            subscribers.len()
        };

        tracing::info!(subscriber = %id, subscribers = count, "Subscriber added");

        Subscription::new(id, rx, cancel, self)
    }

    /// Remove a subscriber
    ///
    /// Drops the hub's end of the queue: events already queued are still
    /// received, after which the subscription ends. Returns `false` if it was
    /// already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.lock();
            (subscribers.remove(&id), subscribers.len())
        };

        match removed {
            Some(_) => {
                tracing::info!(subscriber = %id, subscribers = count, "Subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every current subscriber
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: &Event) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<(SubscriberId, Subscriber)> = {
            let subscribers = self.subscribers.lock();
            if subscribers.is_empty() {
                return 0;
            }
            subscribers
                .iter()
                .map(|(id, sub)| (*id, sub.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, subscriber) in targets {
            if subscriber.cancel.is_cancelled() {
                failed.push(id);
                continue;
            }

            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = %id,
                        capacity = self.queue_capacity,
                        "Subscriber queue full, removing"
                    );
                    failed.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = %id, "Subscriber gone, removing");
                    failed.push(id);
                }
            }
        }

        for id in failed {
            if self.unsubscribe(id) {
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);

        tracing::trace!(
            session = %event.session,
            delivered = delivered,
            "Event published"
        );

        delivered
    }

    /// Check if anyone is listening
    ///
    /// Best effort: a subscriber may join or leave right after this returns.
    /// Producers use it to skip expensive work such as media downloads.
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    /// Number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Remove every subscriber
    ///
    /// Each subscription still receives what was queued before it ends.
    pub fn close_all(&self) {
        let count = {
            let mut subscribers = self.subscribers.lock();
            let count = subscribers.len();
            subscribers.clear();
            count
        };

        if count > 0 {
            tracing::info!(count = count, "All subscribers closed");
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
