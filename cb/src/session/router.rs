//! Inbound message routing
//!
//! Handshakes register the session and drain the queue, theme pushes go to
//! the reconciler when local policy allows, replies are matched against the
//! correlation table. Anything else is ignored.

use tracing::{debug, error, info, warn};

use super::{CallKind, ComponentSession, Lookup, SessionInfo, SessionState};
use crate::error::{BridgeError, DESYNC_ALERT};
use crate::protocol::{InboundMessage, Registration, Reply};

impl ComponentSession {
    pub(super) fn route(&mut self, message: InboundMessage) -> Result<(), BridgeError> {
        debug!(kind = message.kind(), "ComponentSession::route: called");
        match message {
            InboundMessage::Registered(registration) => self.handle_registration(registration),
            InboundMessage::Themes(urls) => {
                if self.accepts_themes {
                    self.reconcile_themes(&urls);
                } else {
                    debug!(count = urls.len(), "Theme push ignored by local policy");
                }
                Ok(())
            }
            InboundMessage::Reply(reply) => self.handle_reply(reply),
            InboundMessage::Unrecognized { action } => {
                debug!(?action, "Ignoring unrecognized action");
                Ok(())
            }
        }
    }

    fn handle_registration(&mut self, registration: Registration) -> Result<(), BridgeError> {
        let Some(session_key) = registration.session_key else {
            warn!("Handshake without session key, staying unregistered");
            return Ok(());
        };

        let environment = registration.data.unwrap_or_default();
        let active_themes = environment.active_theme_urls.clone().unwrap_or_default();
        if self.is_registered() {
            info!("Repeated handshake replaces session state");
        }

        self.component_data = registration.component_data.unwrap_or_default();
        self.state = SessionState::Registered(SessionInfo {
            session_key,
            origin: self.trusted_origin.clone().unwrap_or_default(),
            environment,
        });
        info!(
            environment = ?self.environment().and_then(|e| e.environment.as_deref()),
            platform = ?self.environment().and_then(|e| e.platform.as_deref()),
            queued = self.queue.len(),
            "Component registered"
        );

        let mut first_error = None;

        if !self.config.permissions.is_empty() {
            let permissions = self.config.permissions.clone();
            let data = serde_json::to_value(&permissions)
                .map(|p| serde_json::json!({ "permissions": p }))
                .map_err(BridgeError::Encode);
            let sent = data.and_then(|d| {
                self.send_call("request-permissions".to_string(), Some(d), None, CallKind::OneShot)
            });
            if let Err(e) = sent {
                warn!(error = %e, "Failed to request initial permissions");
                first_error = Some(e);
            }
        }

        if let Err(e) = self.drain_queue() {
            first_error.get_or_insert(e);
        }

        if self.accepts_themes {
            self.reconcile_themes(&active_themes);
        }

        if let Some(mut hook) = self.on_ready.take() {
            hook(self);
            // The hook may have installed a replacement
            self.on_ready.get_or_insert(hook);
        }

        first_error.map_or(Ok(()), Err)
    }

    fn handle_reply(&mut self, reply: Reply) -> Result<(), BridgeError> {
        let message_id = reply.original.message_id;
        debug!(%message_id, data = %reply.data, "ComponentSession::handle_reply: called");

        match self.table.take(&message_id) {
            Lookup::Found(mut call) => {
                (call.on_reply)(self, reply.data);
                self.table.restore(call);
                Ok(())
            }
            Lookup::AlreadyAnswered => {
                debug!(%message_id, "Ignoring reply to an answered call");
                Ok(())
            }
            Lookup::Untracked => {
                debug!(%message_id, "Ignoring reply to a call sent without a callback");
                Ok(())
            }
            Lookup::Unknown => {
                error!(%message_id, "Reply does not match any call, host and component are out of sync");
                self.metrics.desync_errors += 1;
                self.raise_alert(DESYNC_ALERT);
                Err(BridgeError::Desync {
                    message_id: message_id.to_string(),
                })
            }
        }
    }
}
