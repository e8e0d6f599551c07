//! Core-facing operations
//!
//! These are the operations a transport adapter (HTTP, gRPC, ...) exposes.
//! Each returns a typed result; [`StatusResponse`] converts the unit results
//! into the `{ success, error }` shape used on the wire.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::lifecycle::SessionSupervisor;
use crate::error::{Error, Result};
use crate::hub::Subscription;
use crate::pairing::LoginResponse;
use crate::protocol::Attachment;
use crate::session::{Event, Identity, Session};

/// A known device, persisted or live
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identity: Identity,
    pub user: String,
    pub display_name: Option<String>,
    pub connected: bool,
}

/// Outbound message request
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    /// Sending device (identity or account number); first session if unset
    pub from: Option<String>,
    /// Recipient account number
    pub to: String,
    /// Message text, or the caption when an attachment is present
    pub text: Option<String>,
    /// File to send
    pub attachment: Option<Attachment>,
}

impl SendRequest {
    /// Text message to `to`
    pub fn text(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// File message to `to`
    pub fn attachment(to: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            to: to.into(),
            attachment: Some(attachment),
            ..Default::default()
        }
    }

    /// Send from a specific device
    pub fn from_device(mut self, selector: impl Into<String>) -> Self {
        self.from = Some(selector.into());
        self
    }

    /// Set the caption of an attachment
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.text = Some(caption.into());
        self
    }
}

/// Wire-level outcome of a unit operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<()>> for StatusResponse {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

impl SessionSupervisor {
    /// Every persisted or live device, sorted by identity
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let records = self.store.load_all().await?;
        let mut devices = BTreeMap::new();

        for record in records {
            let connected = match self.registry.get(&record.identity).await {
                Some(session) => session.is_connected(),
                None => false,
            };
            devices.insert(
                record.identity.clone(),
                DeviceInfo {
                    user: record.identity.user().to_string(),
                    identity: record.identity,
                    display_name: record.display_name,
                    connected,
                },
            );
        }

        for session in self.registry.snapshot().await {
            devices
                .entry(session.identity().clone())
                .or_insert_with(|| DeviceInfo {
                    identity: session.identity().clone(),
                    user: session.identity().user().to_string(),
                    display_name: session.client().display_name(),
                    connected: session.is_connected(),
                });
        }

        Ok(devices.into_values().collect())
    }

    /// Unlink and forget a device by identity or account number
    pub async fn delete_device(&self, selector: &str) -> Result<()> {
        let session = self.registry.find(selector).await;

        let identity = match &session {
            Some(session) => session.identity().clone(),
            None => {
                let records = self.store.load_all().await?;
                records
                    .into_iter()
                    .map(|record| record.identity)
                    .find(|identity| identity.matches(selector))
                    .ok_or_else(|| Error::DeviceNotFound(selector.to_string()))?
            }
        };

        if let Some(session) = session {
            if session.is_connected() {
                if let Err(e) = session.logout().await {
                    tracing::warn!(identity = %identity, error = %e, "Logout failed, deleting anyway");
                }
            }
            session.disconnect().await;
            self.registry.detach_handler(&identity);
            self.registry.remove(&identity).await;
        }

        self.store.delete(&identity).await?;

        tracing::info!(identity = %identity, "Device deleted");
        Ok(())
    }

    /// Pair a new device
    pub async fn start_login(&self) -> LoginResponse {
        self.pairing.start_login().await
    }

    /// Send a message and publish it to subscribers
    pub async fn send_message(&self, request: SendRequest) -> Result<()> {
        if request.to.is_empty() {
            return Err(Error::InvalidRequest("missing recipient".into()));
        }
        let text = request.text.filter(|text| !text.is_empty());
        if text.is_none() && request.attachment.is_none() {
            return Err(Error::InvalidRequest("nothing to send".into()));
        }

        let session = self.select_sender(request.from.as_deref()).await?;
        let identity = session.identity();

        let event = match &request.attachment {
            Some(attachment) => {
                session
                    .send_media(&request.to, attachment, text.as_deref())
                    .await?;
                let event = Event::media(
                    identity.clone(),
                    identity.user(),
                    request.to.clone(),
                    attachment.media_kind(),
                    attachment.filename.clone(),
                    attachment.data.clone(),
                );
                match text {
                    Some(caption) => event.with_caption(caption),
                    None => event,
                }
            }
            None => {
                let text = text.unwrap_or_default();
                session.send_text(&request.to, &text).await?;
                Event::text(identity.clone(), identity.user(), request.to.clone(), text)
            }
        };

        tracing::info!(identity = %identity, to = %request.to, media = event.is_media(), "Message sent");

        self.hub
            .publish(&event.with_display_name(session.display_name()));
        Ok(())
    }

    async fn select_sender(&self, from: Option<&str>) -> Result<Arc<Session>> {
        let mut sessions = self.registry.snapshot().await;
        if sessions.is_empty() {
            return Err(Error::NoSessions);
        }

        match from.filter(|selector| !selector.is_empty()) {
            Some(selector) => Ok(self.registry.lookup(selector).await?),
            None => {
                let connected = sessions.iter().position(|session| session.is_connected());
                Ok(sessions.swap_remove(connected.unwrap_or(0)))
            }
        }
    }

    /// Subscribe to every event of every session
    pub fn stream_events(&self) -> Subscription {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::Utc;

    use super::*;
    use crate::protocol::mock::MockFactory;
    use crate::protocol::{InboundMessage, MessageContent, ProtocolError, ProtocolEvent};
    use crate::registry::RegistryError;
    use crate::session::{EventPayload, MediaKind};
    use crate::storage::{CredentialRecord, MemoryStore};
    use crate::supervisor::HubConfig;

    async fn started(ids: &[&str]) -> (SessionSupervisor, Arc<MemoryStore>, Arc<MockFactory>) {
        let store = Arc::new(MemoryStore::with_records(
            ids.iter().map(|id| CredentialRecord::new(*id)),
        ));
        let factory = Arc::new(MockFactory::new());
        let sup = SessionSupervisor::new(HubConfig::default(), store.clone(), factory.clone());
        sup.startup().await;
        (sup, store, factory)
    }

    #[tokio::test]
    async fn test_two_subscribers_receive_in_order() {
        let (sup, _store, factory) = started(&["222:1@s"]).await;
        let mut first = sup.stream_events();
        let mut second = sup.stream_events();

        let client = factory.client_for(&"222:1@s".into()).unwrap();
        for text in ["hi", "there"] {
            client
                .emit(ProtocolEvent::Message(InboundMessage {
                    sender: "111".into(),
                    chat: "111".into(),
                    push_name: "Alice".into(),
                    timestamp: Utc::now(),
                    content: MessageContent::Text(text.into()),
                }))
                .await;
        }

        for sub in [&mut first, &mut second] {
            let a = sub.recv().await.unwrap();
            let b = sub.recv().await.unwrap();
            assert_eq!((a.from.as_str(), a.to.as_str()), ("111", "222"));
            assert_eq!(a.text_content(), Some("hi"));
            assert_eq!(b.text_content(), Some("there"));
            assert_eq!(a.display_name, "Alice");
        }
    }

    #[tokio::test]
    async fn test_send_without_sessions() {
        let (sup, _store, _factory) = started(&[]).await;

        let err = sup.send_message(SendRequest::text("222", "hi")).await.unwrap_err();
        assert!(matches!(err, Error::NoSessions));
    }

    #[tokio::test]
    async fn test_send_from_unknown_device() {
        let (sup, _store, _factory) = started(&["111:1@s"]).await;

        let request = SendRequest::text("222", "hi").from_device("999");
        let err = sup.send_message(request).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            Error::Registry(RegistryError::NotFound(ref id)) if id.as_str() == "999"
        ));
        assert_eq!(err.to_string(), "registry error: session not found: 999");
    }

    #[tokio::test]
    async fn test_send_routes_and_publishes() {
        let (sup, _store, factory) = started(&["111:1@s", "333:2@s"]).await;
        let mut sub = sup.stream_events();

        sup.send_message(SendRequest::text("222", "hello").from_device("333"))
            .await
            .unwrap();

        let sender = factory.client_for(&"333:2@s".into()).unwrap();
        assert_eq!(sender.sent()[0].to, "222");
        assert!(factory.client_for(&"111:1@s".into()).unwrap().sent().is_empty());

        let event = sub.recv().await.unwrap();
        assert_eq!(event.from, "333");
        assert_eq!(event.to, "222");
        assert_eq!(event.text_content(), Some("hello"));
    }

    #[tokio::test]
    async fn test_send_defaults_to_first_connected() {
        let store = Arc::new(MemoryStore::with_records([
            CredentialRecord::new("111:1@s"),
            CredentialRecord::new("222:1@s"),
        ]));
        let factory = Arc::new(MockFactory::new());
        factory.fail_connect("111:1@s", ProtocolError::Other("timeout".into()));
        let sup = SessionSupervisor::new(HubConfig::default(), store, factory.clone());
        sup.startup().await;

        sup.send_message(SendRequest::text("999", "hi")).await.unwrap();

        let sender = factory.client_for(&"222:1@s".into()).unwrap();
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_attachment_kind() {
        let (sup, _store, factory) = started(&["111:1@s"]).await;
        let mut sub = sup.stream_events();

        let photo = Attachment::new("photo.PNG", Bytes::from_static(b"png"));
        sup.send_message(SendRequest::attachment("222", photo).with_caption("look"))
            .await
            .unwrap();

        let sent = &factory.client_for(&"111:1@s".into()).unwrap().sent()[0];
        assert_eq!(sent.text.as_deref(), Some("look"));
        assert_eq!(sent.attachment.as_ref().unwrap().mime_type(), "image/png");

        let event = sub.recv().await.unwrap();
        match event.payload {
            EventPayload::Media { media, caption, .. } => {
                assert_eq!(media, MediaKind::Image);
                assert_eq!(caption.as_deref(), Some("look"));
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let report = Attachment::new("report.pdf", Bytes::from_static(b"%PDF"));
        sup.send_message(SendRequest::attachment("222", report)).await.unwrap();
        let event = sub.recv().await.unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::Media { media: MediaKind::Document, .. }
        ));
    }

    #[tokio::test]
    async fn test_send_empty_request_rejected() {
        let (sup, _store, _factory) = started(&["111:1@s"]).await;

        let err = sup.send_message(SendRequest::text("222", "")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_list_devices_merges_store_and_registry() {
        let store = Arc::new(MemoryStore::with_records([
            CredentialRecord::new("111:1@s").with_display_name("Shop"),
            CredentialRecord::new("222:1@s"),
        ]));
        let factory = Arc::new(MockFactory::new());
        factory.fail_connect("222:1@s", ProtocolError::Other("timeout".into()));
        let sup = SessionSupervisor::new(HubConfig::default(), store, factory);
        sup.startup().await;

        let devices = sup.list_devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].user, "111");
        assert_eq!(devices[0].display_name.as_deref(), Some("Shop"));
        assert!(devices[0].connected);
        assert!(!devices[1].connected);
    }

    #[tokio::test]
    async fn test_delete_device_by_account_number() {
        let (sup, store, factory) = started(&["111:1@s"]).await;
        let id = Identity::new("111:1@s");

        sup.delete_device("111").await.unwrap();

        let client = factory.client_for(&id).unwrap();
        assert_eq!(client.logout_calls(), 1);
        assert_eq!(client.disconnect_calls(), 1);
        assert!(!store.contains(&id));
        assert!(!sup.registry().contains(&id).await);
        assert!(!sup.registry().has_handler(&id));
    }

    #[tokio::test]
    async fn test_delete_device_logout_failure_is_not_fatal() {
        let (sup, store, factory) = started(&["111:1@s"]).await;
        let id = Identity::new("111:1@s");
        factory
            .client_for(&id)
            .unwrap()
            .fail_logout(ProtocolError::NotConnected);

        sup.delete_device("111:1@s").await.unwrap();
        assert!(!store.contains(&id));
    }

    #[tokio::test]
    async fn test_delete_unknown_device() {
        let (sup, _store, _factory) = started(&["111:1@s"]).await;

        let result = sup.delete_device("999").await;
        assert!(matches!(result, Err(Error::DeviceNotFound(_))));

        let status = StatusResponse::from(result);
        assert!(!status.success);
        assert_eq!(status.error.as_deref(), Some("device not found: 999"));
    }

    #[test]
    fn test_status_response_serialization() {
        let json = serde_json::to_value(StatusResponse::from(Ok(()))).unwrap();
        assert_eq!(json, serde_json::json!({"success": true}));
    }
}
