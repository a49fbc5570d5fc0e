//! Bridge error types

use thiserror::Error;

/// User-facing text shown when host and component fall out of sync
pub const DESYNC_ALERT: &str = "This extension is attempting to communicate with its host, but an error is \
                                preventing it from doing so. Please restart this extension and try again.";

/// Errors that can occur while exchanging messages with the host
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Reply references unknown message {message_id}")]
    Desync { message_id: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Check if this error means host and component disagree about in-flight calls
    pub fn is_desync(&self) -> bool {
        matches!(self, BridgeError::Desync { .. })
    }

    /// Check if the offending message was dropped without affecting the session
    pub fn is_dropped_message(&self) -> bool {
        matches!(self, BridgeError::Decode(_))
    }
}
