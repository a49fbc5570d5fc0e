//! Inbound boundary entry point

use tracing::{debug, info, warn};

use super::ComponentSession;
use crate::error::BridgeError;
use crate::protocol::InboundMessage;
use crate::transport::InboundEvent;

impl ComponentSession {
    /// Handle one inbound boundary message
    ///
    /// The first origin ever seen becomes the trusted reply target and is
    /// never replaced. Malformed payloads are dropped and reported as
    /// [`BridgeError::Decode`]; the session stays usable after any error.
    pub fn receive(&mut self, event: InboundEvent) -> Result<(), BridgeError> {
        debug!(origin = %event.origin, "ComponentSession::receive: called");

        match self.trusted_origin.as_deref() {
            None => {
                info!(origin = %event.origin, "Trusting first observed origin");
                self.trusted_origin = Some(event.origin);
            }
            Some(trusted) if trusted != event.origin => {
                debug!(%trusted, received = %event.origin, "Message from untrusted origin, replies still go to trusted origin");
            }
            Some(_) => {}
        }

        let value = event.data.decode().inspect_err(|e| {
            warn!(error = %e, "Dropping malformed payload");
            self.metrics.decode_errors += 1;
        })?;
        debug!(payload = %value, "Inbound payload");

        let message = InboundMessage::from_value(value).map_err(|e| {
            warn!(error = %e, "Dropping payload with invalid shape");
            self.metrics.decode_errors += 1;
            BridgeError::Decode(e)
        })?;

        self.metrics.messages_received += 1;
        self.route(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn handshake() -> serde_json::Value {
        json!({"action": "component-registered", "sessionKey": "k", "data": {"environment": "web"}})
    }

    #[test]
    fn test_first_origin_is_trusted_forever() {
        let transport = MemoryTransport::new();
        let mut session = ComponentSession::open(BridgeConfig::default(), transport.clone());

        session.receive(InboundEvent::structured("https://host", handshake())).unwrap();
        session
            .receive(InboundEvent::structured("https://spoof", json!({"action": "noise"})))
            .unwrap();
        assert_eq!(session.trusted_origin(), Some("https://host"));

        session.send("custom", None, None).unwrap();
        assert_eq!(transport.frames()[0].target_origin, "https://host");
    }

    #[test]
    fn test_text_payload_is_decoded() {
        let mut session = ComponentSession::open(BridgeConfig::default(), MemoryTransport::new());
        session
            .receive(InboundEvent::text("https://host", handshake().to_string()))
            .unwrap();
        assert!(session.is_registered());
    }

    #[test]
    fn test_malformed_payload_dropped() {
        let mut session = ComponentSession::open(BridgeConfig::default(), MemoryTransport::new());

        let err = session.receive(InboundEvent::text("https://host", "{oops")).unwrap_err();
        assert!(err.is_dropped_message());

        let err = session
            .receive(InboundEvent::structured("https://host", json!({"original": {"action": "x"}})))
            .unwrap_err();
        assert!(err.is_dropped_message());

        let metrics = session.metrics();
        assert_eq!(metrics.decode_errors, 2);
        assert_eq!(metrics.messages_received, 0);

        // Still usable
        session.receive(InboundEvent::structured("https://host", handshake())).unwrap();
        assert!(session.is_registered());
    }
}
