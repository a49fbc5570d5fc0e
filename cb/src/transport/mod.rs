//! Cross-boundary transport
//!
//! The host delivers messages either as structured JSON or as serialized text
//! (mobile webviews only pass strings). Both shapes are normalized here before
//! the router sees them. Outbound frames go through the [`Transport`] trait.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

mod memory;
mod stdio;

pub use memory::MemoryTransport;
pub use stdio::StdioTransport;

/// Payload as delivered by the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    /// Serialized text that still needs decoding
    Text(String),

    /// Already-decoded structure
    Structured(Value),
}

impl RawPayload {
    /// Normalize to a JSON value
    ///
    /// A structured payload that is itself a JSON string is treated as text.
    pub fn decode(self) -> Result<Value, BridgeError> {
        match self {
            RawPayload::Text(text) | RawPayload::Structured(Value::String(text)) => {
                serde_json::from_str(&text).map_err(BridgeError::Decode)
            }
            RawPayload::Structured(value) => Ok(value),
        }
    }
}

/// One inbound boundary message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Sender origin/address as reported by the channel
    pub origin: String,

    pub data: RawPayload,
}

impl InboundEvent {
    pub fn structured(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data: RawPayload::Structured(data),
        }
    }

    pub fn text(origin: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            data: RawPayload::Text(data.into()),
        }
    }
}

/// Outbound frame, encoded for the host environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Text(String),
    Structured(Value),
}

impl OutboundFrame {
    /// Recover the JSON value carried by the frame
    pub fn to_value(&self) -> Result<Value, BridgeError> {
        match self {
            OutboundFrame::Structured(value) => Ok(value.clone()),
            OutboundFrame::Text(text) => serde_json::from_str(text).map_err(BridgeError::Decode),
        }
    }
}

/// A frame together with the origin it was addressed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedFrame {
    #[serde(rename = "target-origin")]
    pub target_origin: String,

    pub message: OutboundFrame,
}

/// Outbound half of the boundary channel
pub trait Transport {
    /// Deliver one frame to the host at `target_origin`
    fn post(&mut self, frame: OutboundFrame, target_origin: &str) -> Result<(), BridgeError>;
}
