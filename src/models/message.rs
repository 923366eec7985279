//! Message-related models

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One chat message, as shown in a conversation.
///
/// Live frames and history records share this shape. `id` and `timestamp`
/// are optional on the wire; history decoding fills them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Decoded form before the text field is settled. Outbound frames call it
/// `message`; when both keys are present `content` wins.
#[derive(Deserialize)]
struct WireMessage {
    #[serde(default, deserialize_with = "string_or_int")]
    id: Option<String>,
    sender_id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<WireMessage> for ChatMessage {
    type Error = &'static str;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let content = wire
            .content
            .or(wire.message)
            .ok_or("missing field `content`")?;
        Ok(Self {
            id: wire.id,
            sender_id: wire.sender_id,
            content,
            timestamp: wire.timestamp,
        })
    }
}

impl ChatMessage {
    /// New outgoing message authored now, with a fresh client-side id.
    pub fn outgoing(sender_id: &str, content: &str) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Whether this message was authored by `user_id`.
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}

/// Server ids are integers, client ids are UUID strings. Anything else
/// decodes as absent.
fn string_or_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// RFC 3339 first, then a naive `YYYY-MM-DDTHH:MM:SS[.f]` read as UTC.
/// Unparseable values decode as absent instead of failing the message.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_integer_id_becomes_string() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"id":42,"sender_id":"bob","content":"hi"}"#).unwrap();
        assert_eq!(msg.id.as_deref(), Some("42"));
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_message_alias_for_content() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"message":"hello","sender_id":"alice","receiver_id":"bob"}"#)
                .unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.sender_id, "alice");
        assert!(msg.id.is_none());
    }

    #[test]
    fn test_both_text_keys_prefer_content() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"sender_id":"bob","content":"from content","message":"from message"}"#,
        )
        .unwrap();
        assert_eq!(msg.content, "from content");

        let msg: ChatMessage =
            serde_json::from_str(r#"{"sender_id":"bob","content":null,"message":"hi"}"#).unwrap();
        assert_eq!(msg.content, "hi");

        assert!(serde_json::from_str::<ChatMessage>(r#"{"sender_id":"bob"}"#).is_err());
    }

    #[test]
    fn test_bad_timestamp_is_absent() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"sender_id":"bob","content":"hi","timestamp":"yesterday-ish"}"#,
        )
        .unwrap();
        assert!(msg.timestamp.is_none());

        let msg: ChatMessage =
            serde_json::from_str(r#"{"sender_id":"bob","content":"hi","timestamp":17}"#).unwrap();
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T10:00:00"), Some(expected));
        assert!(parse_timestamp("2024-01-01T10:00:00.250Z").is_some());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_outgoing_has_id_and_time() {
        let a = ChatMessage::outgoing("alice", "hello");
        let b = ChatMessage::outgoing("alice", "hello");
        assert!(a.id.is_some());
        assert!(a.timestamp.is_some());
        assert_ne!(a.id, b.id);
        assert!(a.is_from("alice"));
        assert!(!a.is_from("bob"));
    }
}
