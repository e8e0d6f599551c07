//! Session to hub event bridge
//!
//! One task per session reads the protocol event sequence, normalises each
//! message into an [`Event`] and publishes it to the [`BroadcastHub`]. The
//! task is attached through the registry so that a session never gets two.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::handle::Session;
use super::normalize::normalize;
use crate::hub::BroadcastHub;
use crate::protocol::{InboundMessage, MessageContent, ProtocolEvent};
use crate::registry::SessionRegistry;

/// Attaches per-session event handlers
pub struct EventBridge;

impl EventBridge {
    /// Start forwarding events of `session` into `hub`
    ///
    /// No-op when a handler is already attached for the identity or the
    /// session's event sequence was already taken. Returns whether a new
    /// handler was started.
    pub fn attach(
        registry: &SessionRegistry,
        hub: &Arc<BroadcastHub>,
        session: &Arc<Session>,
    ) -> bool {
        registry.attach_handler(session.identity(), || {
            let Some(events) = session.take_events() else {
                tracing::warn!(
                    identity = %session.identity(),
                    "Event sequence already taken, no handler attached"
                );
                return None;
            };
            let session = Arc::clone(session);
            let hub = Arc::clone(hub);
            Some(tokio::spawn(pump(session, hub, events)))
        })
    }
}

async fn pump(
    session: Arc<Session>,
    hub: Arc<BroadcastHub>,
    mut events: mpsc::Receiver<ProtocolEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProtocolEvent::Message(message) => forward(&session, &hub, message).await,
            ProtocolEvent::Connected => {
                tracing::info!(identity = %session.identity(), "Session connected");
            }
            ProtocolEvent::Disconnected => {
                tracing::warn!(identity = %session.identity(), "Session disconnected");
            }
            ProtocolEvent::LoggedOut => {
                tracing::warn!(identity = %session.identity(), "Session logged out remotely");
            }
        }
    }

    tracing::debug!(identity = %session.identity(), "Event sequence ended");
}

async fn forward(session: &Session, hub: &BroadcastHub, message: InboundMessage) {
    session.touch();

    // Nobody listening: skip normalisation and media downloads
    if !hub.has_subscribers() {
        tracing::trace!(identity = %session.identity(), "No subscribers, message not forwarded");
        return;
    }

    let media = match &message.content {
        MessageContent::Media(media_ref) => match session.download(media_ref).await {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(
                    identity = %session.identity(),
                    sender = %message.sender,
                    error = %e,
                    "Media download failed, message skipped"
                );
                return;
            }
        },
        _ => None,
    };

    let Some(event) = normalize(session.identity(), &message, media) else {
        tracing::debug!(
            identity = %session.identity(),
            sender = %message.sender,
            "Unsupported message skipped"
        );
        return;
    };

    hub.publish(&event);
}
