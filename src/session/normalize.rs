//! Inbound message normalisation
//!
//! Converts a protocol message into the [`Event`] shape seen by subscribers.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::event::Event;
use super::identity::Identity;
use crate::protocol::{InboundMessage, MediaRef, MessageContent};

/// Sender and recipient of a message as seen from `own` account number
///
/// Messages sent by the account itself (from another linked device) go to
/// the chat; everything else is addressed to the account.
pub fn direction(own: &str, message: &InboundMessage) -> (String, String) {
    if message.sender == own {
        (message.sender.clone(), message.chat.clone())
    } else {
        (message.sender.clone(), own.to_string())
    }
}

/// File name given to downloaded media: `{from}_{timestamp}{ext}`
pub fn media_filename(from: &str, timestamp: DateTime<Utc>, media: &MediaRef) -> String {
    format!(
        "{}_{}{}",
        from,
        timestamp.format("%Y-%m-%d_%H%M%S"),
        media.extension()
    )
}

/// Build the event for a message received by `session`
///
/// `media` carries the downloaded content of a media message. Returns `None`
/// for unsupported content and for media without data.
pub fn normalize(
    session: &Identity,
    message: &InboundMessage,
    media: Option<Bytes>,
) -> Option<Event> {
    let (from, to) = direction(session.user(), message);

    let event = match &message.content {
        MessageContent::Text(text) => Event::text(session.clone(), from, to, text.clone()),
        MessageContent::Media(media_ref) => {
            let data = media?;
            let filename = media_filename(&from, message.timestamp, media_ref);
            let event = Event::media(session.clone(), from, to, media_ref.kind, filename, data);
            match &media_ref.caption {
                Some(caption) => event.with_caption(caption.clone()),
                None => event,
            }
        }
        MessageContent::Unsupported => return None,
    };

    Some(
        event
            .with_display_name(message.push_name.clone())
            .with_timestamp(message.timestamp),
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::session::{EventPayload, MediaKind};

    fn message(sender: &str, chat: &str, content: MessageContent) -> InboundMessage {
        InboundMessage {
            sender: sender.into(),
            chat: chat.into(),
            push_name: "Bob".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            content,
        }
    }

    #[test]
    fn test_direction_incoming() {
        let msg = message("222", "222", MessageContent::Text("hi".into()));
        assert_eq!(direction("111", &msg), ("222".to_string(), "111".to_string()));
    }

    #[test]
    fn test_direction_own_message() {
        let msg = message("111", "333", MessageContent::Text("hi".into()));
        assert_eq!(direction("111", &msg), ("111".to_string(), "333".to_string()));
    }

    #[test]
    fn test_normalize_text() {
        let session = Identity::new("111:2@s.whatsapp.net");
        let msg = message("222", "222", MessageContent::Text("hello".into()));

        let event = normalize(&session, &msg, None).unwrap();
        assert_eq!(event.session, session);
        assert_eq!(event.from, "222");
        assert_eq!(event.to, "111");
        assert_eq!(event.display_name, "Bob");
        assert_eq!(event.text_content(), Some("hello"));
        assert_eq!(event.timestamp, msg.timestamp);
    }

    #[test]
    fn test_normalize_media_filename() {
        let session = Identity::new("111:2@s");
        let mut media = MediaRef::new(MediaKind::Image, "loc-1");
        media.caption = Some("look".into());
        let msg = message("222", "222", MessageContent::Media(media));

        let event = normalize(&session, &msg, Some(Bytes::from_static(b"jpeg"))).unwrap();
        match &event.payload {
            EventPayload::Media {
                media,
                filename,
                caption,
                data,
            } => {
                assert_eq!(*media, MediaKind::Image);
                assert_eq!(filename, "222_2024-03-09_140507.jpg");
                assert_eq!(caption.as_deref(), Some("look"));
                assert_eq!(data.as_ref(), b"jpeg");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_document_keeps_extension() {
        let media = MediaRef::new(MediaKind::Document, "loc").with_file_name("report.final.pdf");
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(media_filename("222", ts, &media), "222_2024-01-02_030405.pdf");

        let unnamed = MediaRef::new(MediaKind::Document, "loc");
        assert_eq!(media_filename("222", ts, &unnamed), "222_2024-01-02_030405.bin");
    }

    #[test]
    fn test_skip_unsupported_and_missing_media() {
        let session = Identity::new("111:2@s");
        let unsupported = message("222", "222", MessageContent::Unsupported);
        assert!(normalize(&session, &unsupported, None).is_none());

        let media = message(
            "222",
            "222",
            MessageContent::Media(MediaRef::new(MediaKind::Audio, "loc")),
        );
        assert!(normalize(&session, &media, None).is_none());
    }
}
