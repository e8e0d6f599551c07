//! Normalised events broadcast to subscribers
//!
//! Every inbound (or locally sent) message is converted once, at the session
//! boundary, into an [`Event`]. Events are immutable and cheap to clone:
//! media data is held in `bytes::Bytes`, so every subscriber shares the same
//! allocation.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::identity::Identity;

/// Kind of media carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// File extension used when naming downloaded media of this kind
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => ".jpg",
            MediaKind::Video => ".mp4",
            MediaKind::Audio => ".ogg",
            MediaKind::Document => ".bin",
        }
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Plain text message
    Text { text: String },
    /// Media message with its downloaded content
    Media {
        media: MediaKind,
        filename: String,
        caption: Option<String>,
        data: Bytes,
    },
}

/// A message event delivered to every subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Session that produced the event
    pub session: Identity,
    /// Sender account number
    pub from: String,
    /// Recipient account number
    pub to: String,
    /// Sender display name
    pub display_name: String,
    /// Message content
    pub payload: EventPayload,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a text event
    pub fn text(
        session: Identity,
        from: impl Into<String>,
        to: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session,
            from: from.into(),
            to: to.into(),
            display_name: String::new(),
            payload: EventPayload::Text { text: text.into() },
            timestamp: Utc::now(),
        }
    }

    /// Create a media event
    pub fn media(
        session: Identity,
        from: impl Into<String>,
        to: impl Into<String>,
        media: MediaKind,
        filename: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            session,
            from: from.into(),
            to: to.into(),
            display_name: String::new(),
            payload: EventPayload::Media {
                media,
                filename: filename.into(),
                caption: None,
                data,
            },
            timestamp: Utc::now(),
        }
    }

    /// Set the sender display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the message timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the caption of a media event (ignored for text)
    pub fn with_caption(mut self, text: impl Into<String>) -> Self {
        if let EventPayload::Media { ref mut caption, .. } = self.payload {
            *caption = Some(text.into());
        }
        self
    }

    /// Message text, or the caption for media
    pub fn text_content(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Text { text } => Some(text),
            EventPayload::Media { caption, .. } => caption.as_deref(),
        }
    }

    /// Check if this is a media event
    pub fn is_media(&self) -> bool {
        matches!(self.payload, EventPayload::Media { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_event_serialization() {
        let event = Event::text(Identity::new("111:1@s"), "111", "222", "hi")
            .with_display_name("Alice");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["session"], "111:1@s");
        assert_eq!(json["from"], "111");
        assert_eq!(json["to"], "222");
        assert_eq!(json["payload"]["kind"], "text");
        assert_eq!(json["payload"]["text"], "hi");
        assert_eq!(json["display_name"], "Alice");
    }

    #[test]
    fn test_media_caption() {
        let event = Event::media(
            Identity::new("111:1@s"),
            "111",
            "222",
            MediaKind::Image,
            "111_photo.jpg",
            Bytes::from_static(b"\xff\xd8"),
        )
        .with_caption("look");

        assert!(event.is_media());
        assert_eq!(event.text_content(), Some("look"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["kind"], "media");
        assert_eq!(json["payload"]["media"], "image");
    }

    #[test]
    fn test_caption_ignored_for_text() {
        let event = Event::text(Identity::new("1@s"), "1", "2", "x").with_caption("y");
        assert_eq!(event.text_content(), Some("x"));
    }
}
