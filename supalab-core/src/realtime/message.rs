//! Phoenix channel envelope spoken by the realtime server.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const ACCESS_TOKEN: &str = "access_token";
pub const BROADCAST: &str = "broadcast";
pub const PRESENCE: &str = "presence";
pub const PRESENCE_STATE: &str = "presence_state";
pub const PRESENCE_DIFF: &str = "presence_diff";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const SYSTEM: &str = "system";

pub const PHOENIX_TOPIC: &str = "phoenix";
pub const TOPIC_PREFIX: &str = "realtime:";
pub const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default)]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            msg_ref: None,
            join_ref: None,
        }
    }

    pub fn with_ref(mut self, msg_ref: impl Into<String>) -> Self {
        self.msg_ref = Some(msg_ref.into());
        self
    }

    pub fn with_join_ref(mut self, join_ref: Option<String>) -> Self {
        self.join_ref = join_ref;
        self
    }

    pub fn heartbeat(msg_ref: impl Into<String>) -> Self {
        Self::new(PHOENIX_TOPIC, HEARTBEAT, json!({})).with_ref(msg_ref)
    }

    /// `status` of a `phx_reply`.
    pub fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    /// `response` of a `phx_reply`.
    pub fn reply_response(&self) -> &Value {
        self.payload.get("response").unwrap_or(&Value::Null)
    }
}

pub fn topic_for(channel: &str) -> String {
    format!("{TOPIC_PREFIX}{channel}")
}

pub fn channel_for(topic: &str) -> Option<&str> {
    topic.strip_prefix(TOPIC_PREFIX)
}

/// Payload of a broadcast push.
pub fn broadcast_payload(event: &str, payload: Value) -> Value {
    json!({
        "type": BROADCAST,
        "event": event,
        "payload": payload,
    })
}

/// Payload of a presence track push.
pub fn track_payload(payload: Value) -> Value {
    json!({
        "type": PRESENCE,
        "event": "track",
        "payload": payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_field_name() {
        let msg = PhoenixMessage::heartbeat("7");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "topic": "phoenix",
                "event": "heartbeat",
                "payload": {},
                "ref": "7",
                "join_ref": null
            })
        );
    }

    #[test]
    fn test_reply_parsing() {
        let msg: PhoenixMessage = serde_json::from_str(
            r#"{"topic":"realtime:room","event":"phx_reply","payload":{"status":"ok","response":{"postgres_changes":[]}},"ref":"1"}"#,
        )
        .unwrap();
        assert_eq!(msg.reply_status(), Some("ok"));
        assert_eq!(msg.reply_response()["postgres_changes"], json!([]));
        assert_eq!(msg.join_ref, None);
        assert_eq!(channel_for(&msg.topic), Some("room"));
    }

    #[test]
    fn test_topics() {
        assert_eq!(topic_for("room1"), "realtime:room1");
        assert_eq!(channel_for("phoenix"), None);
    }
}
