//! Phoenix channel frames as spoken by the Realtime endpoint (`vsn=1.0.0`).
//!
//! Frames are JSON objects `{topic, event, payload, ref, join_ref}`. This
//! module builds the handful of outbound frames the client sends and sorts
//! inbound frames into [`Inbound`] so the socket loop only deals with
//! outcomes, never raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::state::ToggleState;

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_SYSTEM: &str = "system";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

/// Topic that carries heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

// =============================================================================
// FRAME
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    /// Join `topic`, subscribing to `UPDATE`s on `public.<table>`.
    #[must_use]
    pub fn join(topic: &str, table: &str, access_token: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_owned(),
            event: EVENT_JOIN.to_owned(),
            payload: join_payload(table, access_token),
            reference: Some(reference.to_owned()),
            join_ref: Some(reference.to_owned()),
        }
    }

    #[must_use]
    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_owned(),
            event: EVENT_HEARTBEAT.to_owned(),
            payload: json!({}),
            reference: Some(reference.to_owned()),
            join_ref: None,
        }
    }

    #[must_use]
    pub fn leave(topic: &str, join_ref: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_owned(),
            event: EVENT_LEAVE.to_owned(),
            payload: json!({}),
            reference: Some(reference.to_owned()),
            join_ref: Some(join_ref.to_owned()),
        }
    }

    /// Serialize to the JSON text sent on the socket.
    ///
    /// # Errors
    ///
    /// Returns an error only if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a Phoenix frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// `realtime:<channel>`
#[must_use]
pub fn channel_topic(channel: &str) -> String {
    format!("realtime:{channel}")
}

#[must_use]
pub fn join_payload(table: &str, access_token: &str) -> Value {
    json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "UPDATE", "schema": "public", "table": table }
            ]
        },
        "access_token": access_token
    })
}

// =============================================================================
// INBOUND CLASSIFICATION
// =============================================================================

/// What an inbound frame means to the subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a join or heartbeat, matched by `reference`.
    Reply { reference: Option<String>, ok: bool, response: Value },
    /// An `UPDATE` on the subscribed table.
    Change(ToggleState),
    /// `phx_error` on the channel.
    ChannelError(String),
    /// `phx_close` on the channel.
    ChannelClosed,
    /// A `system` message reporting a failed extension (e.g. bad table).
    SystemError(String),
    /// Anything else: presence, broadcasts, other topics, non-UPDATE changes.
    Ignored,
}

/// Sort an inbound frame. Only replies on `phoenix` and frames on `topic`
/// are considered; everything else is `Ignored`.
#[must_use]
pub fn classify(message: &PhoenixMessage, topic: &str) -> Inbound {
    if message.event == EVENT_REPLY && (message.topic == topic || message.topic == PHOENIX_TOPIC) {
        let ok = message.payload.get("status").and_then(Value::as_str) == Some("ok");
        let response = message.payload.get("response").cloned().unwrap_or(Value::Null);
        return Inbound::Reply { reference: message.reference.clone(), ok, response };
    }
    if message.topic != topic {
        return Inbound::Ignored;
    }

    match message.event.as_str() {
        EVENT_POSTGRES_CHANGES => classify_change(&message.payload),
        EVENT_ERROR => Inbound::ChannelError(reason(&message.payload, "channel error")),
        EVENT_CLOSE => Inbound::ChannelClosed,
        EVENT_SYSTEM => match message.payload.get("status").and_then(Value::as_str) {
            Some("error") => Inbound::SystemError(reason(&message.payload, "realtime system error")),
            _ => Inbound::Ignored,
        },
        _ => Inbound::Ignored,
    }
}

fn classify_change(payload: &Value) -> Inbound {
    let Some(data) = payload.get("data") else {
        return Inbound::Ignored;
    };
    if data.get("type").and_then(Value::as_str) != Some("UPDATE") {
        return Inbound::Ignored;
    }
    data.get("record")
        .and_then(|record| serde_json::from_value::<ToggleState>(record.clone()).ok())
        .map_or(Inbound::Ignored, Inbound::Change)
}

/// Pull a human-readable reason out of an error payload.
fn reason(payload: &Value, fallback: &str) -> String {
    payload
        .get("message")
        .or_else(|| payload.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_owned()
}

/// Reason text for a rejected join reply (`{"reason": "..."}` or similar).
#[must_use]
pub fn rejection_reason(response: &Value) -> String {
    reason(response, "join rejected")
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
