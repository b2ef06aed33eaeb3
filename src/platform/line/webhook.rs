//! LINE Messaging API webhook payloads.
//!
//! Every inbound request carries `x-line-signature`, the base64-encoded
//! HMAC-SHA256 of the raw body keyed with the channel secret.

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Verify a LINE webhook signature in constant time.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Message(MessageEvent),
    /// follow, unfollow, join, postback, ... and anything LINE adds later.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(default)]
    pub reply_token: Option<String>,
    pub source: Source,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    #[serde(rename_all = "camelCase")]
    User {
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Group {
        #[serde(default)]
        group_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Room {
        #[serde(default)]
        room_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl Source {
    /// Group chats and multi-person rooms both need explicit addressing.
    pub fn is_group_or_room(&self) -> bool {
        matches!(self, Source::Group { .. } | Source::Room { .. })
    }

    /// Where a reply will land: the group, the room, or the user.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Source::User { user_id } => user_id.as_deref(),
            Source::Group { group_id } => group_id.as_deref(),
            Source::Room { room_id } => room_id.as_deref(),
            Source::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text(TextMessage),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextMessage {
    /// `null` and a missing key both read as empty text.
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEvent {
    /// The reply token and text of a text message event, if this is one.
    pub fn as_text_message(&self) -> Option<(&MessageEvent, &str)> {
        match self {
            WebhookEvent::Message(ev) => match &ev.message {
                Message::Text(t) => Some((ev, t.text.as_deref().unwrap_or_default())),
                Message::Other => None,
            },
            WebhookEvent::Other => None,
        }
    }
}

/// Parse the typed event list. Events whose shape does not match the typed
/// model become [`WebhookEvent::Other`] so positions stay aligned with
/// [`raw_events`].
pub fn parse_events(body: &[u8]) -> Result<Vec<WebhookEvent>> {
    let parsed: WebhookBody =
        serde_json::from_slice(body).context("Failed to parse webhook body")?;

    Ok(parsed
        .events
        .into_iter()
        .map(|raw| {
            serde_json::from_value(raw).unwrap_or_else(|e| {
                debug!("Treating unparseable event as other: {}", e);
                WebhookEvent::Other
            })
        })
        .collect())
}

/// The untyped `events` array, used only for mention lookup. Any anomaly
/// yields an empty list.
pub fn raw_events(body: &[u8]) -> Vec<serde_json::Value> {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|mut v| match v.get_mut("events").map(serde_json::Value::take) {
            Some(serde_json::Value::Array(events)) => Some(events),
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_passes() {
        let sig = sign("channel-secret", b"{\"events\":[]}");
        assert!(verify_signature("channel-secret", b"{\"events\":[]}", &sig));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sig = sign("right", b"body");
        assert!(!verify_signature("wrong", b"body", &sig));
    }

    #[test]
    fn test_tampered_body_fails() {
        let sig = sign("secret", b"original");
        assert!(!verify_signature("secret", b"tampered", &sig));
    }

    #[test]
    fn test_garbage_and_empty_signature_fail() {
        assert!(!verify_signature("secret", b"body", "not base64!!"));
        assert!(!verify_signature("secret", b"body", ""));
    }

    fn sample_body() -> Vec<u8> {
        json!({
            "destination": "Ubot",
            "events": [
                {
                    "type": "message",
                    "replyToken": "rt-1",
                    "source": {"type": "group", "groupId": "G1", "userId": "U1"},
                    "message": {
                        "type": "text", "id": "m1", "text": "ババア 元気？",
                        "mention": {"mentionees": [{"index": 0, "length": 3, "userId": "Ubot"}]}
                    }
                },
                {"type": "follow", "replyToken": "rt-2", "source": {"type": "user", "userId": "U2"}},
                {
                    "type": "message",
                    "replyToken": "rt-3",
                    "source": {"type": "user", "userId": "U3"},
                    "message": {"type": "sticker", "id": "m3", "packageId": "1", "stickerId": "2"}
                },
                {"type": "message", "replyToken": "rt-4"},
                {
                    "type": "message",
                    "replyToken": "rt-5",
                    "source": {"type": "group", "userId": "U5"},
                    "message": {"type": "text", "id": "m5", "text": "ババア hi"}
                },
                {
                    "type": "message",
                    "replyToken": "rt-6",
                    "source": {"type": "room", "roomId": "R6"},
                    "message": {"type": "text", "id": "m6", "text": null}
                }
            ]
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_parse_events_keeps_positions() {
        let events = parse_events(&sample_body()).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(raw_events(&sample_body()).len(), 6);

        let (ev, text) = events[0].as_text_message().unwrap();
        assert_eq!(text, "ババア 元気？");
        assert_eq!(ev.reply_token.as_deref(), Some("rt-1"));
        assert!(ev.source.is_group_or_room());

        assert_eq!(events[1], WebhookEvent::Other);
        assert!(events[2].as_text_message().is_none());
        // Missing source/message: unparseable, kept as a placeholder.
        assert_eq!(events[3], WebhookEvent::Other);

        // Group membership comes from the source type alone.
        let (ev, text) = events[4].as_text_message().unwrap();
        assert_eq!(text, "ババア hi");
        assert!(ev.source.is_group_or_room());
        assert_eq!(ev.source.conversation_id(), None);

        // Null text is still a text message, with empty content.
        let (ev, text) = events[5].as_text_message().unwrap();
        assert_eq!(text, "");
        assert_eq!(ev.reply_token.as_deref(), Some("rt-6"));
        assert_eq!(ev.source.conversation_id(), Some("R6"));
    }

    #[test]
    fn test_room_and_user_sources() {
        let room: Source = serde_json::from_value(json!({"type": "room", "roomId": "R1"})).unwrap();
        assert!(room.is_group_or_room());
        let user: Source = serde_json::from_value(json!({"type": "user", "userId": "U"})).unwrap();
        assert!(!user.is_group_or_room());
        let odd: Source = serde_json::from_value(json!({"type": "channel"})).unwrap();
        assert_eq!(odd, Source::Unknown);
    }

    #[test]
    fn test_parse_events_rejects_non_json() {
        assert!(parse_events(b"not json").is_err());
    }

    #[test]
    fn test_raw_events_never_fails() {
        assert!(raw_events(b"not json").is_empty());
        assert!(raw_events(b"{\"events\": 3}").is_empty());
        assert!(raw_events(b"{}").is_empty());
    }
}
