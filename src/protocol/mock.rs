//! Scripted protocol client for tests and demos
//!
//! [`MockClient`] behaves like a device connection without any network
//! access: pairing follows a pre-programmed script of [`PairingStep`]s,
//! inbound events are injected with [`MockClient::emit`], and every outbound
//! call is recorded for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    Attachment, ClientFactory, MediaRef, PairingEvent, ProtocolClient, ProtocolError,
    ProtocolEvent,
};
use crate::session::Identity;
use crate::storage::CredentialRecord;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const PAIRING_CHANNEL_CAPACITY: usize = 16;

/// One step of a pairing script, played after `connect()`
#[derive(Debug, Clone)]
pub enum PairingStep {
    /// Emit a pairing code
    Code(String),
    /// Link the device to `identity` and emit success
    Success(Identity),
    /// Emit a scan timeout
    Timeout,
    /// Emit a pairing error
    Error(String),
    /// Wait before the next step
    Delay(Duration),
    /// Close the pairing channel
    Close,
}

/// A message sent through a mock client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

/// Scripted in-process protocol client
pub struct MockClient {
    identity: Arc<Mutex<Option<Identity>>>,
    display_name: Option<String>,
    connected: AtomicBool,
    connect_error: Mutex<Option<ProtocolError>>,
    logout_error: Mutex<Option<ProtocolError>>,
    events_tx: mpsc::Sender<ProtocolEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ProtocolEvent>>>,
    pairing_tx: Arc<Mutex<Option<mpsc::Sender<PairingEvent>>>>,
    pairing_opened: AtomicBool,
    pairing_script: Mutex<Vec<PairingStep>>,
    media: Mutex<HashMap<String, Bytes>>,
    sent: Mutex<Vec<SentMessage>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    sync_calls: AtomicUsize,
}

impl MockClient {
    /// Create an unpaired client with no pairing script
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            identity: Arc::new(Mutex::new(None)),
            display_name: None,
            connected: AtomicBool::new(false),
            connect_error: Mutex::new(None),
            logout_error: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            pairing_tx: Arc::new(Mutex::new(None)),
            pairing_opened: AtomicBool::new(false),
            pairing_script: Mutex::new(Vec::new()),
            media: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
        }
    }

    /// Create a client that is already paired to `identity`
    pub fn paired(identity: impl Into<Identity>) -> Self {
        let client = Self::new();
        *client.identity.lock() = Some(identity.into());
        client
    }

    /// Create an unpaired client that plays `script` once connected
    pub fn pairing(script: Vec<PairingStep>) -> Self {
        let client = Self::new();
        *client.pairing_script.lock() = script;
        client
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Make every `connect()` fail with `error`
    pub fn fail_connect(&self, error: ProtocolError) {
        *self.connect_error.lock() = Some(error);
    }

    /// Make `logout()` fail with `error`
    pub fn fail_logout(&self, error: ProtocolError) {
        *self.logout_error.lock() = Some(error);
    }

    /// Register downloadable content under `locator`
    pub fn add_media(&self, locator: impl Into<String>, data: Bytes) {
        self.media.lock().insert(locator.into(), data);
    }

    /// Inject an inbound protocol event
    pub async fn emit(&self, event: ProtocolEvent) {
        if self.events_tx.send(event).await.is_err() {
            tracing::debug!("Mock event dropped, receiver gone");
        }
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::Relaxed)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::Relaxed)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::Relaxed)
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::Relaxed)
    }

    fn play_pairing_script(&self) {
        let script = std::mem::take(&mut *self.pairing_script.lock());
        if script.is_empty() {
            return;
        }

        let identity = Arc::clone(&self.identity);
        let pairing_tx = Arc::clone(&self.pairing_tx);

        tokio::spawn(async move {
            for step in script {
                let event = match step {
                    PairingStep::Delay(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    PairingStep::Close => {
                        pairing_tx.lock().take();
                        return;
                    }
                    PairingStep::Code(code) => PairingEvent::Code(code),
                    PairingStep::Success(id) => {
                        *identity.lock() = Some(id);
                        PairingEvent::Success
                    }
                    PairingStep::Timeout => PairingEvent::Timeout,
                    PairingStep::Error(reason) => PairingEvent::Error(reason),
                };

                let Some(tx) = pairing_tx.lock().clone() else {
                    return;
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
    }

    fn record(&self, message: SentMessage) {
        self.sent.lock().push(message);
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    fn identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.clone()
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        self.connect_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(err) = self.connect_error.lock().clone() {
            return Err(err);
        }

        self.connected.store(true, Ordering::Relaxed);
        let _ = self.events_tx.try_send(ProtocolEvent::Connected);
        self.play_pairing_script();
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
    }

    async fn logout(&self) -> Result<(), ProtocolError> {
        self.logout_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.logout_error.lock().clone() {
            return Err(err);
        }
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<(), ProtocolError> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        self.record(SentMessage {
            to: to.to_string(),
            text: Some(text.to_string()),
            attachment: None,
        });
        Ok(())
    }

    async fn send_media(
        &self,
        to: &str,
        attachment: &Attachment,
        caption: Option<&str>,
    ) -> Result<(), ProtocolError> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        self.record(SentMessage {
            to: to.to_string(),
            text: caption.map(str::to_string),
            attachment: Some(attachment.clone()),
        });
        Ok(())
    }

    async fn download_attachment(&self, media: &MediaRef) -> Result<Bytes, ProtocolError> {
        self.media
            .lock()
            .get(&media.locator)
            .cloned()
            .ok_or_else(|| ProtocolError::Media(format!("unknown media {}", media.locator)))
    }

    async fn sync_state(&self) -> Result<(), ProtocolError> {
        self.sync_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<ProtocolEvent>> {
        self.events_rx.lock().take()
    }

    fn open_pairing_channel(&self) -> Option<mpsc::Receiver<PairingEvent>> {
        if self.pairing_opened.swap(true, Ordering::Relaxed) {
            return None;
        }
        let (tx, rx) = mpsc::channel(PAIRING_CHANNEL_CAPACITY);
        *self.pairing_tx.lock() = Some(tx);
        Some(rx)
    }
}

/// Factory handing out [`MockClient`]s
#[derive(Default)]
pub struct MockFactory {
    queued: Mutex<VecDeque<Arc<MockClient>>>,
    connect_failures: Mutex<HashMap<Identity, ProtocolError>>,
    created: Mutex<Vec<Arc<MockClient>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a client to be returned by the next `new_device()`
    pub fn queue_device(&self, client: MockClient) -> Arc<MockClient> {
        let client = Arc::new(client);
        self.queued.lock().push_back(Arc::clone(&client));
        client
    }

    /// Make clients restored for `identity` fail to connect
    pub fn fail_connect(&self, identity: impl Into<Identity>, error: ProtocolError) {
        self.connect_failures.lock().insert(identity.into(), error);
    }

    /// Every client created so far
    pub fn created(&self) -> Vec<Arc<MockClient>> {
        self.created.lock().clone()
    }

    /// Most recent client created for `identity`
    pub fn client_for(&self, identity: &Identity) -> Option<Arc<MockClient>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|client| client.identity().as_ref() == Some(identity))
            .cloned()
    }

    fn track(&self, client: Arc<MockClient>) -> Arc<dyn ProtocolClient> {
        self.created.lock().push(Arc::clone(&client));
        client
    }
}

impl ClientFactory for MockFactory {
    fn new_device(&self) -> Arc<dyn ProtocolClient> {
        let client = self
            .queued
            .lock()
            .pop_front()
            .unwrap_or_else(|| Arc::new(MockClient::new()));
        self.track(client)
    }

    fn restore(&self, record: &CredentialRecord) -> Arc<dyn ProtocolClient> {
        let mut client = MockClient::paired(record.identity.clone());
        if let Some(name) = &record.display_name {
            client = client.with_display_name(name.clone());
        }
        if let Some(err) = self.connect_failures.lock().get(&record.identity) {
            client.fail_connect(err.clone());
        }
        self.track(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pairing_script_plays_after_connect() {
        let client = MockClient::pairing(vec![
            PairingStep::Code("ref-1".into()),
            PairingStep::Success(Identity::new("111:1@s")),
        ]);
        let mut rx = client.open_pairing_channel().unwrap();
        assert!(client.open_pairing_channel().is_none());

        client.connect().await.unwrap();

        assert_eq!(rx.recv().await, Some(PairingEvent::Code("ref-1".into())));
        assert_eq!(rx.recv().await, Some(PairingEvent::Success));
        assert_eq!(client.identity(), Some(Identity::new("111:1@s")));
    }

    #[tokio::test]
    async fn test_close_step_ends_channel() {
        let client = MockClient::pairing(vec![PairingStep::Close]);
        let mut rx = client.open_pairing_channel().unwrap();
        client.connect().await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_events_taken_once() {
        let client = MockClient::paired("111:1@s");
        let mut events = client.take_events().unwrap();
        assert!(client.take_events().is_none());

        client.connect().await.unwrap();
        assert_eq!(events.recv().await, Some(ProtocolEvent::Connected));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let client = MockClient::paired("111:1@s");
        let err = client.send_text("222", "hi").await.unwrap_err();
        assert_eq!(err, ProtocolError::NotConnected);

        client.connect().await.unwrap();
        client.send_text("222", "hi").await.unwrap();
        assert_eq!(client.sent()[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_factory_restore_applies_failures() {
        let factory = MockFactory::new();
        factory.fail_connect("111:1@s", ProtocolError::Status(401));

        let record = CredentialRecord::new("111:1@s");
        let _client = factory.restore(&record);

        let mock = factory.client_for(&Identity::new("111:1@s")).unwrap();
        assert_eq!(
            mock.connect_error.lock().clone(),
            Some(ProtocolError::Status(401))
        );
    }
}
