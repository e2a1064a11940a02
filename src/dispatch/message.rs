//! Flow messages and the host collaborator interface.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Message id field set by the flow host
pub const MESSAGE_ID_FIELD: &str = "_msgid";

/// A message travelling between flow stages.
///
/// Only `payload` is interpreted here; every other field is carried along
/// untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMessage {
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl FlowMessage {
    /// New message with a fresh `_msgid`.
    pub fn new(payload: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(
            MESSAGE_ID_FIELD.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
        Self { payload, fields }
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get(MESSAGE_ID_FIELD).and_then(Value::as_str)
    }

    /// Copy of this message with the payload replaced.
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            payload,
            fields: self.fields.clone(),
        }
    }
}

/// Per-invocation status shown on the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Error => "error",
        }
    }

    /// Indicator colour used by the editor.
    pub fn fill(&self) -> &'static str {
        match self {
            Status::Pending => "blue",
            Status::Success => "yellow",
            Status::Error => "red",
        }
    }
}

/// What a dispatching node needs from the flow host.
pub trait NodeContext: Send + Sync {
    /// Publish a status transition.
    fn status(&self, status: Status);

    /// Forward a message to the next stage.
    fn send(&self, msg: FlowMessage);

    /// Report a failure against the message that caused it.
    fn error(&self, error: &BridgeError, msg: &FlowMessage);
}
