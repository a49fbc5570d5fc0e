//! Session handshake state

use crate::protocol::Environment;

/// Outcome of a successful handshake
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Credential attached to every envelope
    pub session_key: String,

    /// Address replies are posted to
    pub origin: String,

    pub environment: Environment,
}

impl SessionInfo {
    pub fn is_mobile(&self) -> bool {
        self.environment.environment.as_deref() == Some("mobile")
    }

    pub fn is_desktop(&self) -> bool {
        self.environment.environment.as_deref() == Some("desktop")
    }
}

/// Registration state
///
/// There is no way back from `Registered`; a fresh session needs a new
/// channel. A repeated handshake replaces the `SessionInfo` wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Unregistered,
    Registered(SessionInfo),
}

impl SessionState {
    pub fn is_registered(&self) -> bool {
        matches!(self, SessionState::Registered(_))
    }

    pub fn info(&self) -> Option<&SessionInfo> {
        match self {
            SessionState::Unregistered => None,
            SessionState::Registered(info) => Some(info),
        }
    }
}
