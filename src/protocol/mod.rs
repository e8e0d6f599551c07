//! Protocol capability consumed by the hub
//!
//! The device protocol itself (connection, encryption, media transfer) lives
//! outside this crate. The hub only sees it through [`ProtocolClient`], one
//! instance per account connection, and [`ClientFactory`], which creates
//! clients for new pairings and for persisted credentials.
//!
//! Each client exposes two one-shot channels:
//! - [`ProtocolClient::take_events`]: inbound messages and connection state,
//!   an infinite sequence that can be taken exactly once.
//! - [`ProtocolClient::open_pairing_channel`]: the rotating pairing codes and
//!   the pairing outcome. Must be opened before `connect()`.

pub mod mock;
pub mod signatures;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::session::{Identity, MediaKind};
use crate::storage::CredentialRecord;

pub use signatures::CredentialFailure;

/// Error reported by a protocol client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The remote server answered with an HTTP-like status code
    #[error("server responded with {0}")]
    Status(u16),

    /// The account was logged out from another device
    #[error("got 401: logged out from another device connect failure")]
    LoggedOut,

    /// The operation requires a live connection
    #[error("websocket not connected")]
    NotConnected,

    /// Media upload or download failed
    #[error("media transfer failed: {0}")]
    Media(String),

    /// Any other failure, carried as text
    #[error("{0}")]
    Other(String),
}

/// Event produced while pairing a new device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A fresh exchange code to show to the user
    Code(String),
    /// The device was linked
    Success,
    /// The current code expired without being scanned
    Timeout,
    /// The pairing attempt reported an error
    Error(String),
}

impl PairingEvent {
    /// Short status name
    pub fn name(&self) -> &'static str {
        match self {
            PairingEvent::Code(_) => "code",
            PairingEvent::Success => "success",
            PairingEvent::Timeout => "timeout",
            PairingEvent::Error(_) => "error",
        }
    }
}

/// Reference to downloadable media inside an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Media kind
    pub kind: MediaKind,
    /// Original file name (documents only)
    pub file_name: Option<String>,
    /// Expected size in bytes, if announced
    pub file_length: Option<u64>,
    /// Caption attached to the media
    pub caption: Option<String>,
    /// Opaque locator understood by the protocol client
    pub locator: String,
}

impl MediaRef {
    /// Create a media reference
    pub fn new(kind: MediaKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            file_name: None,
            file_length: None,
            caption: None,
            locator: locator.into(),
        }
    }

    /// Set the original file name
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// File extension for this media, including the leading dot
    ///
    /// Documents keep the extension of their original name when it has one.
    pub fn extension(&self) -> String {
        if self.kind == MediaKind::Document {
            if let Some(ext) = self
                .file_name
                .as_deref()
                .and_then(|name| name.rfind('.').map(|idx| &name[idx..]))
            {
                return ext.to_string();
            }
        }
        self.kind.default_extension().to_string()
    }
}

/// Content of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Text (conversation, extended text, button or template replies)
    Text(String),
    /// Downloadable media
    Media(MediaRef),
    /// Anything the hub does not forward
    Unsupported,
}

/// Message received by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender account number
    pub sender: String,
    /// Chat account number
    pub chat: String,
    /// Sender display name
    pub push_name: String,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
    /// Message content
    pub content: MessageContent,
}

/// Inbound protocol event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// A message was received (or echoed from another device of this account)
    Message(InboundMessage),
    /// The connection was established
    Connected,
    /// The connection dropped
    Disconnected,
    /// The account was logged out remotely
    LoggedOut,
}

/// File attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name, used to pick media kind and MIME type
    pub filename: String,
    /// File content
    pub data: Bytes,
}

impl Attachment {
    /// Create an attachment
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Images are sent as images, everything else as documents
    pub fn media_kind(&self) -> MediaKind {
        match self.extension().as_str() {
            "jpg" | "jpeg" | "png" | "webp" => MediaKind::Image,
            _ => MediaKind::Document,
        }
    }

    /// MIME type derived from the file extension
    pub fn mime_type(&self) -> &'static str {
        match self.extension().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "pdf" => "application/pdf",
            "txt" => "text/plain",
            "csv" => "text/csv",
            "json" => "application/json",
            "zip" => "application/zip",
            "mp4" => "video/mp4",
            "ogg" => "audio/ogg",
            "mp3" => "audio/mpeg",
            "doc" => "application/msword",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "xls" => "application/vnd.ms-excel",
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            _ => "application/octet-stream",
        }
    }
}

/// One account connection, as provided by the protocol layer
#[async_trait]
pub trait ProtocolClient: Send + Sync + 'static {
    /// Account identity; `None` until the device has been paired
    fn identity(&self) -> Option<Identity>;

    /// Display name of the account
    fn display_name(&self) -> Option<String>;

    /// Open the connection
    async fn connect(&self) -> Result<(), ProtocolError>;

    /// Close the connection
    async fn disconnect(&self);

    /// Unlink the device from the account
    async fn logout(&self) -> Result<(), ProtocolError>;

    /// Whether the connection is currently open
    fn is_connected(&self) -> bool;

    /// Send a text message to an account number
    async fn send_text(&self, to: &str, text: &str) -> Result<(), ProtocolError>;

    /// Upload and send a file to an account number
    async fn send_media(
        &self,
        to: &str,
        attachment: &Attachment,
        caption: Option<&str>,
    ) -> Result<(), ProtocolError>;

    /// Download the content of an inbound media message
    async fn download_attachment(&self, media: &MediaRef) -> Result<Bytes, ProtocolError>;

    /// Fetch the post-login synchronization state
    async fn sync_state(&self) -> Result<(), ProtocolError>;

    /// Take the inbound event sequence; returns `None` once taken
    fn take_events(&self) -> Option<mpsc::Receiver<ProtocolEvent>>;

    /// Open the pairing code channel; returns `None` if already opened
    fn open_pairing_channel(&self) -> Option<mpsc::Receiver<PairingEvent>>;
}

/// Creates protocol clients
pub trait ClientFactory: Send + Sync + 'static {
    /// A fresh, unpaired device
    fn new_device(&self) -> Arc<dyn ProtocolClient>;

    /// A client for previously persisted credentials
    fn restore(&self, record: &CredentialRecord) -> Arc<dyn ProtocolClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_kind_and_mime() {
        let photo = Attachment::new("Photo.JPG", Bytes::from_static(b"x"));
        assert_eq!(photo.media_kind(), MediaKind::Image);
        assert_eq!(photo.mime_type(), "image/jpeg");

        let invoice = Attachment::new("invoice.pdf", Bytes::from_static(b"x"));
        assert_eq!(invoice.media_kind(), MediaKind::Document);
        assert_eq!(invoice.mime_type(), "application/pdf");

        let unknown = Attachment::new("blob", Bytes::from_static(b"x"));
        assert_eq!(unknown.media_kind(), MediaKind::Document);
        assert_eq!(unknown.mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_media_extension() {
        let doc = MediaRef::new(MediaKind::Document, "d1").with_file_name("report.final.xlsx");
        assert_eq!(doc.extension(), ".xlsx");

        let nameless = MediaRef::new(MediaKind::Document, "d2").with_file_name("README");
        assert_eq!(nameless.extension(), ".bin");

        let audio = MediaRef::new(MediaKind::Audio, "a1");
        assert_eq!(audio.extension(), ".ogg");
    }

    #[test]
    fn test_pairing_event_names() {
        assert_eq!(PairingEvent::Code("x".into()).name(), "code");
        assert_eq!(PairingEvent::Error("x".into()).name(), "error");
    }
}
