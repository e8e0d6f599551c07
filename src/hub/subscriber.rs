//! Subscriber handles
//!
//! The hub keeps a [`Subscriber`] per consumer (send queue plus cancellation
//! token); the consumer holds the matching [`Subscription`] and reads events
//! from it until it is cancelled, dropped or evicted by the hub.

use std::sync::{Arc, Weak};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::BroadcastHub;
use crate::session::Event;

/// Unique identifier of a subscriber within one hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Hub-side state of one subscriber
#[derive(Debug, Clone)]
pub(super) struct Subscriber {
    pub(super) tx: mpsc::Sender<Event>,
    pub(super) cancel: CancellationToken,
}

/// Consumer-side handle of one subscriber
///
/// Unsubscribes exactly once: on [`close`](Subscription::close), on drop,
/// or when the stream ends. Cancelling the token ends the stream at once;
/// removal by the hub ends it after the already queued events.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    hub: Option<Weak<BroadcastHub>>,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<Event>,
        cancel: CancellationToken,
        hub: &Arc<BroadcastHub>,
    ) -> Self {
        Self {
            id,
            rx,
            cancel,
            hub: Some(Arc::downgrade(hub)),
        }
    }

    /// Subscriber ID
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Token that ends this subscription when cancelled
    ///
    /// Hand a clone to whatever tracks the consumer's connection.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check if the subscription has ended
    pub fn is_closed(&self) -> bool {
        self.hub.is_none()
    }

    /// Receive the next event
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<Event> {
        if self.hub.is_none() {
            return None;
        }

        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        };

        if next.is_none() {
            self.close();
        }
        next
    }

    /// Receive an event if one is already queued
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.hub.is_none() || self.cancel.is_cancelled() {
            self.close();
            return None;
        }
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.close();
                None
            }
        }
    }

    /// End the subscription and remove it from the hub
    pub fn close(&mut self) {
        let Some(hub) = self.hub.take() else {
            return;
        };
        self.cancel.cancel();
        self.rx.close();
        if let Some(hub) = hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }

    /// Convert into a stream of events
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
