//! Component protocol session
//!
//! A [`ComponentSession`] owns everything one component needs to talk to its
//! host: the trusted origin captured from the first inbound message, the
//! handshake state, the pre-registration queue, the correlation table, the
//! save coalescer and the active theme set.
//!
//! All state is single-writer: inbound events, timer polls and public calls
//! run on one logical thread. Reply callbacks receive `&mut ComponentSession`
//! so they can issue follow-up calls.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::coalescer::{PendingBatch, SaveCoalescer};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::protocol::{API_NAME, Envelope, Environment, Item, MessageId};
use crate::themes::{LoggingThemeSink, ThemeDiff, ThemeReconciler, ThemeSink};
use crate::transport::{OutboundFrame, Transport};

mod correlation;
mod id;
mod items;
mod listener;
mod queue;
mod router;
mod state;

pub use correlation::{CallKind, CorrelationTable, Lookup, PendingCall};
pub use id::IdGenerator;
pub use items::{ItemCallback, ItemsCallback};
pub use queue::{OutboundQueue, QueuedCall};
pub use state::{SessionInfo, SessionState};

/// Callback run with each reply to a call
pub type ReplyCallback = Box<dyn FnMut(&mut ComponentSession, Value)>;

/// Hook run once registration completes and the queue has drained
pub type ReadyHook = Box<dyn FnMut(&mut ComponentSession)>;

/// Hook that shows a message to the end user
pub type AlertHook = Box<dyn FnMut(&str)>;

/// Wrap a single-use closure as a reply callback
pub fn reply_once(f: impl FnOnce(&mut ComponentSession, Value) + 'static) -> ReplyCallback {
    let mut f = Some(f);
    Box::new(move |session: &mut ComponentSession, data: Value| {
        if let Some(f) = f.take() {
            f(session, data);
        }
    })
}

/// Session counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub queued_calls: usize,
    pub pending_calls: usize,
    pub desync_errors: u64,
    pub decode_errors: u64,
    pub saves_flushed: u64,
    pub expired_calls: u64,
}

/// One component's protocol session with its host
pub struct ComponentSession {
    config: BridgeConfig,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    ids: IdGenerator,
    state: SessionState,
    trusted_origin: Option<String>,
    queue: OutboundQueue<ReplyCallback>,
    table: CorrelationTable<ReplyCallback>,
    coalescer: SaveCoalescer<ReplyCallback>,
    themes: ThemeReconciler,
    theme_sink: Box<dyn ThemeSink>,
    accepts_themes: bool,
    component_data: Map<String, Value>,
    last_streamed: Option<Item>,
    on_ready: Option<ReadyHook>,
    on_alert: Option<AlertHook>,
    metrics: SessionMetrics,
}

impl ComponentSession {
    /// Open a session over `transport`
    ///
    /// Nothing is transmitted until the host's handshake arrives.
    pub fn open(config: BridgeConfig, transport: impl Transport + 'static) -> Self {
        debug!(?config, "ComponentSession::open: called");
        let coalescer = SaveCoalescer::new(config.saving_delay(), config.coalesced_saving);
        let table = CorrelationTable::with_untracked_history(config.answered_history, config.untracked_history);
        Self {
            accepts_themes: config.accepts_themes,
            config,
            transport: Box::new(transport),
            clock: Box::new(SystemClock),
            ids: IdGenerator::new(),
            state: SessionState::Unregistered,
            trusted_origin: None,
            queue: OutboundQueue::new(),
            table,
            coalescer,
            themes: ThemeReconciler::new(),
            theme_sink: Box::new(LoggingThemeSink),
            component_data: Map::new(),
            last_streamed: None,
            on_ready: None,
            on_alert: None,
            metrics: SessionMetrics::default(),
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Use a different stylesheet collaborator
    pub fn with_theme_sink(mut self, sink: impl ThemeSink + 'static) -> Self {
        self.theme_sink = Box::new(sink);
        self
    }

    /// Use a specific id generator
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Run `hook` after every successful handshake
    pub fn on_ready(mut self, hook: impl FnMut(&mut ComponentSession) + 'static) -> Self {
        self.on_ready = Some(Box::new(hook));
        self
    }

    /// Show user-facing errors through `hook`
    pub fn on_alert(mut self, hook: impl FnMut(&str) + 'static) -> Self {
        self.on_alert = Some(Box::new(hook));
        self
    }

    /// End the session
    ///
    /// A pending save is written first. Calls still waiting for replies are
    /// dropped.
    pub fn close(mut self) -> SessionMetrics {
        debug!("ComponentSession::close: called");
        if let Err(e) = self.flush_pending_save() {
            warn!(error = %e, "Failed to flush pending save on close");
        }

        let metrics = self.metrics();
        let dropped = self.table.clear();
        if dropped > 0 {
            warn!(dropped, "Closing session with unanswered calls");
        }
        info!(sent = metrics.messages_sent, received = metrics.messages_received, "Session closed");
        metrics
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state.is_registered()
    }

    /// Origin captured from the first inbound message
    pub fn trusted_origin(&self) -> Option<&str> {
        self.trusted_origin.as_deref()
    }

    /// Environment descriptor from the handshake
    pub fn environment(&self) -> Option<&Environment> {
        self.state.info().map(|info| &info.environment)
    }

    /// The host's identifier for this component
    pub fn self_component_uuid(&self) -> Option<&str> {
        self.environment().and_then(|env| env.uuid.as_deref())
    }

    pub fn is_running_in_desktop_application(&self) -> bool {
        self.state.info().is_some_and(SessionInfo::is_desktop)
    }

    pub fn is_mobile(&self) -> bool {
        self.state.info().is_some_and(SessionInfo::is_mobile)
    }

    /// Current counters
    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            queued_calls: self.queue.len(),
            pending_calls: self.table.len(),
            ..self.metrics.clone()
        }
    }

    /// Send a call to the host
    ///
    /// Before registration the call is queued and `Ok(None)` is returned; the
    /// identifier is assigned when the queue drains. Afterwards the envelope
    /// goes out immediately and its identifier is returned.
    pub fn send(
        &mut self,
        action: &str,
        data: Option<Value>,
        on_reply: Option<ReplyCallback>,
    ) -> Result<Option<MessageId>, BridgeError> {
        self.send_call(action.to_string(), data, on_reply, CallKind::OneShot)
    }

    /// Forget a call; any later reply to it is ignored
    pub fn cancel(&mut self, message_id: &MessageId) -> bool {
        debug!(%message_id, "ComponentSession::cancel: called");
        self.table.cancel(message_id)
    }

    /// Whether a reply for `message_id` is still expected
    pub fn is_pending(&self, message_id: &MessageId) -> bool {
        self.table.contains(message_id)
    }

    /// Fire due timers: the save debounce window and reply deadlines
    pub fn poll(&mut self) -> Result<(), BridgeError> {
        let now = self.clock.now();

        for expired in self.table.sweep(now) {
            warn!(message_id = %expired.message_id, action = %expired.action, "Call expired without a reply");
            self.metrics.expired_calls += 1;
        }

        if let Some(batch) = self.coalescer.poll(now) {
            self.write_batch(batch)?;
        }
        Ok(())
    }

    /// Earliest instant at which [`ComponentSession::poll`] has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.coalescer.next_deadline(), self.table.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Apply `urls` as the active theme set, bypassing the theme policy
    pub fn reconcile_themes(&mut self, urls: &[String]) -> ThemeDiff {
        self.themes.reconcile(urls, self.theme_sink.as_mut())
    }

    /// Remove a single theme, leaving the rest applied
    pub fn deactivate_theme(&mut self, url: &str) -> bool {
        debug!(url, "ComponentSession::deactivate_theme: called");
        self.themes.deactivate(url, self.theme_sink.as_mut())
    }

    /// Theme URLs currently applied
    pub fn active_themes(&self) -> &[String] {
        self.themes.active()
    }

    /// Local policy for theme pushes from the host
    pub fn set_accepts_themes(&mut self, accepts: bool) {
        debug!(accepts, "ComponentSession::set_accepts_themes: called");
        self.accepts_themes = accepts;
    }

    pub fn accepts_themes(&self) -> bool {
        self.accepts_themes
    }

    pub(crate) fn send_call(
        &mut self,
        action: String,
        data: Option<Value>,
        on_reply: Option<ReplyCallback>,
        kind: CallKind,
    ) -> Result<Option<MessageId>, BridgeError> {
        let data = data.filter(|d| !d.is_null());

        let Some(info) = self.state.info() else {
            debug!(%action, queued = self.queue.len() + 1, "ComponentSession::send_call: not registered, queueing");
            self.queue.push(QueuedCall {
                action,
                data,
                on_reply,
                kind,
            });
            return Ok(None);
        };

        let message_id = self.ids.next_id();
        let envelope = Envelope {
            action: action.clone(),
            data,
            message_id: message_id.clone(),
            session_key: Some(info.session_key.clone()),
            permissions: (self.config.embed_permissions && !self.config.permissions.is_empty())
                .then(|| self.config.permissions.clone()),
            api: API_NAME.to_string(),
        };
        let origin = info.origin.clone();
        let frame = self.encode(&envelope)?;

        match on_reply {
            Some(on_reply) => {
                let deadline = match kind {
                    CallKind::OneShot => self.config.reply_timeout().map(|t| self.clock.now() + t),
                    CallKind::Stream => None,
                };
                self.table.insert(PendingCall {
                    message_id: message_id.clone(),
                    action: action.clone(),
                    kind,
                    deadline,
                    on_reply,
                });
            }
            // No callback to run, but a courtesy reply is not a desync
            None => self.table.insert_untracked(message_id.clone()),
        }

        debug!(%action, %message_id, envelope = ?envelope, "Posting message");
        if let Err(e) = self.transport.post(frame, &origin) {
            self.table.cancel(&message_id);
            return Err(e);
        }
        self.metrics.messages_sent += 1;
        Ok(Some(message_id))
    }

    fn encode(&self, envelope: &Envelope) -> Result<OutboundFrame, BridgeError> {
        // Mobile webviews only accept string messages
        if self.is_mobile() {
            serde_json::to_string(envelope)
                .map(OutboundFrame::Text)
                .map_err(BridgeError::Encode)
        } else {
            serde_json::to_value(envelope)
                .map(OutboundFrame::Structured)
                .map_err(BridgeError::Encode)
        }
    }

    /// Send every queued call in issue order
    ///
    /// All calls are attempted; the first transport error is returned.
    fn drain_queue(&mut self) -> Result<(), BridgeError> {
        let calls = self.queue.drain();
        if calls.is_empty() {
            return Ok(());
        }
        debug!(count = calls.len(), "ComponentSession::drain_queue: replaying queued calls");

        let mut first_error = None;
        for call in calls {
            if let Err(e) = self.send_call(call.action, call.data, call.on_reply, call.kind) {
                warn!(error = %e, "Failed to send queued call");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn write_batch(&mut self, batch: PendingBatch<ReplyCallback>) -> Result<(), BridgeError> {
        let (items, on_flush) = batch.finish();
        if items.is_empty() {
            return Ok(());
        }
        debug!(items = items.len(), "ComponentSession::write_batch: saving");
        let wire: Vec<Value> = items.iter().map(Item::to_wire).collect();
        self.metrics.saves_flushed += 1;
        self.send_call(
            "save-items".to_string(),
            Some(serde_json::json!({ "items": wire })),
            on_flush,
            CallKind::OneShot,
        )?;
        Ok(())
    }

    fn raise_alert(&mut self, message: &str) {
        match self.on_alert.as_mut() {
            Some(hook) => hook(message),
            None => tracing::error!("{}", message),
        }
    }
}
