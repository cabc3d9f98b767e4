//! Wire formats for the relay
//!
//! - Upstream envelope: one JSON object mapping routing key → update object.
//! - Outbound frames: `{"event": <name>, "data": <body>}` pushed to clients.
//!   Relay events are named by routing key and carry
//!   `{"channel": "CHANNEL", "message": "<serialized history>"}`.
//! - Client actions: `{"action": "subscribe" | "unsubscribe" | "publish", ...}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use types::errors::RelayError;

/// Constant tag carried in every relay event body.
pub const RELAY_CHANNEL_TAG: &str = "CHANNEL";

/// Event name of the greeting sent on connect.
pub const CONNECTED_EVENT: &str = "connected";

/// Event name of action acknowledgements.
pub const ACK_EVENT: &str = "ack";

/// Decoded upstream envelope: routing key → raw update object.
///
/// Per-key updates stay undecoded here so one bad key cannot poison the
/// others.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEnvelope {
    entries: Map<String, Value>,
}

impl UpstreamEnvelope {
    /// Decode a raw bus message. Anything other than a JSON object fails as a
    /// whole, since keys cannot be enumerated.
    pub fn decode(raw: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| RelayError::MalformedUpstreamMessage(e.to_string()))?;

        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(RelayError::MalformedUpstreamMessage(format!(
                "expected a JSON object, got {}",
                value_kind(&other)
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume into `(key, update)` pairs.
    pub fn into_entries(self) -> impl Iterator<Item = (String, Value)> {
        self.entries.into_iter()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Server → client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame<T> {
    pub event: String,
    pub data: T,
}

/// Body of a relay event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub channel: String,
    /// JSON-serialized key history (oldest first)
    pub message: String,
}

/// Build the frame broadcast for `key` after an upsert.
pub fn relay_frame(key: &str, serialized_history: String) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ServerFrame {
        event: key.to_string(),
        data: RelayMessage {
            channel: RELAY_CHANNEL_TAG.to_string(),
            message: serialized_history,
        },
    })
}

/// Greeting sent once a client is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connected {
    pub client_id: String,
}

pub fn connected_frame(client_id: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ServerFrame {
        event: CONNECTED_EVENT.to_string(),
        data: Connected {
            client_id: client_id.to_string(),
        },
    })
}

/// Client-initiated action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Declare interest in a channel (clears a previous mute).
    Subscribe { channel: String },
    /// Mute a channel for this client only.
    Unsubscribe { channel: String },
    /// Forward a message onto the upstream bus unmodified.
    Publish { channel: String, message: String },
}

impl ClientAction {
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::Subscribe { .. } => "subscribe",
            ClientAction::Unsubscribe { .. } => "unsubscribe",
            ClientAction::Publish { .. } => "publish",
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            ClientAction::Subscribe { channel }
            | ClientAction::Unsubscribe { channel }
            | ClientAction::Publish { channel, .. } => channel,
        }
    }
}

/// Legacy name of the publish action.
const LEGACY_PUBLISH_ACTION: &str = "send message";

/// Parse a raw client text frame.
pub fn parse_client_action(json: &str) -> Option<ClientAction> {
    let mut value: Value = serde_json::from_str(json).ok()?;
    if let Some(action) = value.get_mut("action") {
        if action.as_str() == Some(LEGACY_PUBLISH_ACTION) {
            *action = Value::String("publish".to_string());
        }
    }
    serde_json::from_value(value).ok()
}

/// Server response to a client action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    pub action: String,
    pub channel: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionAck {
    pub fn ok(action: &ClientAction) -> Self {
        Self {
            action: action.name().to_string(),
            channel: action.channel().to_string(),
            success: true,
            error: None,
        }
    }

    pub fn failed(action: &ClientAction, error: impl Into<String>) -> Self {
        Self {
            action: action.name().to_string(),
            channel: action.channel().to_string(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ServerFrame {
            event: ACK_EVENT.to_string(),
            data: self,
        })
    }
}
