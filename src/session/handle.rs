//! Live session handle
//!
//! A [`Session`] binds one identity to its protocol client. It is owned by
//! the registry once registered and shared as `Arc<Session>`.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::identity::Identity;
use crate::protocol::{Attachment, MediaRef, ProtocolClient, ProtocolError, ProtocolEvent};

/// One authenticated account connection
pub struct Session {
    identity: Identity,
    client: Arc<dyn ProtocolClient>,
    last_activity: Mutex<DateTime<Utc>>,
}

impl Session {
    /// Create a session for an identity and its client
    pub fn new(identity: Identity, client: Arc<dyn ProtocolClient>) -> Self {
        let now = Utc::now();
        Self {
            identity,
            client,
            last_activity: Mutex::new(now),
        }
    }

    /// Session identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Underlying protocol client
    pub fn client(&self) -> &Arc<dyn ProtocolClient> {
        &self.client
    }

    /// Display name reported by the client, or the account number
    pub fn display_name(&self) -> String {
        self.client
            .display_name()
            .unwrap_or_else(|| self.identity.user().to_string())
    }

    /// Whether this session wraps exactly `client`
    pub fn uses_client(&self, client: &Arc<dyn ProtocolClient>) -> bool {
        Arc::ptr_eq(&self.client, client)
    }

    /// Open the connection
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        self.client.connect().await?;
        self.touch();
        Ok(())
    }

    /// Close the connection
    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }

    /// Unlink the device from the account
    pub async fn logout(&self) -> Result<(), ProtocolError> {
        self.client.logout().await
    }

    /// Check if the connection is open
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Send a text message
    pub async fn send_text(&self, to: &str, text: &str) -> Result<(), ProtocolError> {
        self.client.send_text(to, text).await?;
        self.touch();
        Ok(())
    }

    /// Send a file, optionally with a caption
    pub async fn send_media(
        &self,
        to: &str,
        attachment: &Attachment,
        caption: Option<&str>,
    ) -> Result<(), ProtocolError> {
        self.client.send_media(to, attachment, caption).await?;
        self.touch();
        Ok(())
    }

    /// Download inbound media
    pub async fn download(&self, media: &MediaRef) -> Result<Bytes, ProtocolError> {
        self.client.download_attachment(media).await
    }

    /// Fetch post-connect synchronization state
    pub async fn sync_state(&self) -> Result<(), ProtocolError> {
        self.client.sync_state().await
    }

    /// Take the inbound event sequence (only once per session)
    pub fn take_events(&self) -> Option<mpsc::Receiver<ProtocolEvent>> {
        self.client.take_events()
    }

    /// Record activity on this session
    pub fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    /// Time of the last recorded activity
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("connected", &self.is_connected())
            .field("last_activity", &self.last_activity())
            .finish()
    }
}
