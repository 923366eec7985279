//! Wire codec for chat frames and REST message payloads

use chrono::Utc;
use serde::Serialize;

use crate::models::{ChatMessage, GroupId};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed chat frame: {0}")]
    Frame(#[source] serde_json::Error),
    #[error("history payload is not a list: {0}")]
    History(#[source] serde_json::Error),
}

/// Frame sent to the room. Field order matches what the server emits.
#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    message: &'a str,
    sender_id: &'a str,
    receiver_id: &'a str,
}

/// Body of `POST chat/save/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveMessageRequest {
    pub group: GroupId,
    pub sender_id: String,
    pub content: String,
    pub timestamp: String,
}

/// Encode one outbound frame addressed to `recipient_id`.
pub fn encode_outbound(message: &ChatMessage, recipient_id: &str) -> serde_json::Result<String> {
    serde_json::to_string(&OutboundFrame {
        message: &message.content,
        sender_id: &message.sender_id,
        receiver_id: recipient_id,
    })
}

/// Decode one inbound frame (text or binary payload).
pub fn decode_frame(payload: &[u8]) -> Result<ChatMessage, DecodeError> {
    serde_json::from_slice(payload).map_err(DecodeError::Frame)
}

/// Decode a history listing.
///
/// Records without a usable `sender_id`/`content` are skipped. Missing ids
/// get a generated placeholder and missing or unreadable timestamps become
/// the current time.
pub fn decode_history(payload: &[u8]) -> Result<Vec<ChatMessage>, DecodeError> {
    let records: Vec<serde_json::Value> =
        serde_json::from_slice(payload).map_err(DecodeError::History)?;

    let now = Utc::now();
    let mut messages = Vec::with_capacity(records.len());
    for record in records {
        let mut message: ChatMessage = match serde_json::from_value(record) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Skipping history record: {}", e);
                continue;
            }
        };
        if message.id.is_none() {
            message.id = Some(uuid::Uuid::new_v4().to_string());
        }
        if message.timestamp.is_none() {
            message.timestamp = Some(now);
        }
        messages.push(message);
    }

    Ok(messages)
}

/// Build the save request for a message sent in `group`.
pub fn save_request(group: GroupId, message: &ChatMessage) -> SaveMessageRequest {
    SaveMessageRequest {
        group,
        sender_id: message.sender_id.clone(),
        content: message.content.clone(),
        timestamp: message.timestamp.unwrap_or_else(Utc::now).to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_outbound_frame_shape() {
        let msg = ChatMessage::outgoing("alice", "hello");
        let frame = encode_outbound(&msg, "bob").unwrap();
        assert_eq!(
            frame,
            r#"{"message":"hello","sender_id":"alice","receiver_id":"bob"}"#
        );
    }

    #[test]
    fn test_outbound_decodes_back() {
        let msg = ChatMessage::outgoing("alice", "line one\n\"quoted\" ✓");
        let frame = encode_outbound(&msg, "bob").unwrap();
        let decoded = decode_frame(frame.as_bytes()).unwrap();
        assert_eq!(decoded.sender_id, msg.sender_id);
        assert_eq!(decoded.content, msg.content);
    }

    #[test]
    fn test_stored_shape_decodes_back() {
        let msg = ChatMessage::outgoing("alice", "hello");
        let json = serde_json::to_vec(&msg).unwrap();
        let decoded = decode_frame(&json).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_frame_missing_fields_rejected() {
        assert!(decode_frame(br#"{"content":"hi"}"#).is_err());
        assert!(decode_frame(br#"{"sender_id":"bob"}"#).is_err());
        assert!(decode_frame(br#"{"sender_id":"bob","content":5}"#).is_err());
        assert!(decode_frame(b"not json").is_err());
        assert!(decode_frame(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_frame_with_both_text_keys() {
        let msg =
            decode_frame(br#"{"sender_id":"bob","content":"hi","message":"hi"}"#).unwrap();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.sender_id, "bob");
    }

    #[test]
    fn test_frame_optional_fields() {
        let msg = decode_frame(br#"{"sender_id":"bob","content":"hi"}"#).unwrap();
        assert!(msg.id.is_none());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_history_single_record() {
        let payload =
            br#"[{"sender_id":"bob","content":"hi","timestamp":"2024-01-01T10:00:00Z"}]"#;
        let msgs = decode_history(payload).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].sender_id, "bob");
        assert_eq!(
            msgs[0].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_history_placeholders() {
        let before = Utc::now();
        let payload = br#"[
            {"sender_id":"bob","content":"one"},
            {"sender_id":"bob","content":"two","timestamp":"garbage"},
            {"id":9,"sender_id":"alice","content":"three","timestamp":null}
        ]"#;
        let msgs = decode_history(payload).unwrap();
        assert_eq!(msgs.len(), 3);

        let id0 = msgs[0].id.clone().unwrap();
        let id1 = msgs[1].id.clone().unwrap();
        assert!(!id0.is_empty());
        assert_ne!(id0, id1);
        assert_eq!(msgs[2].id.as_deref(), Some("9"));

        for msg in &msgs {
            assert!(msg.timestamp.unwrap() >= before);
        }
    }

    #[test]
    fn test_history_skips_bad_records_keeps_order() {
        let payload = br#"[
            {"sender_id":"bob","content":"first"},
            {"content":"no sender"},
            {"sender_id":"bob"},
            {"sender_id":7,"content":"wrong type"},
            "not an object",
            {"sender_id":"alice","content":"second"}
        ]"#;
        let msgs = decode_history(payload).unwrap();
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn test_history_not_a_list() {
        assert!(decode_history(br#"{"detail":"Not found."}"#).is_err());
        assert!(decode_history(b"").is_err());
    }

    #[test]
    fn test_save_request_body() {
        let mut msg = ChatMessage::outgoing("alice", "hello");
        msg.timestamp = Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        let body = serde_json::to_value(save_request(12, &msg)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "group": 12,
                "sender_id": "alice",
                "content": "hello",
                "timestamp": "2024-01-01T10:00:00+00:00"
            })
        );
    }
}
