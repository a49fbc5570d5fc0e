//! Correlation table for outbound calls awaiting replies

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use tracing::debug;

use crate::protocol::MessageId;

/// How a call expects to be answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Exactly one reply; the record is removed when it arrives
    OneShot,

    /// Subscription answered repeatedly under the same id
    Stream,
}

/// Record of a call waiting for its reply
pub struct PendingCall<C> {
    pub message_id: MessageId,
    pub action: String,
    pub kind: CallKind,
    pub deadline: Option<Instant>,
    pub on_reply: C,
}

impl<C> std::fmt::Debug for PendingCall<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("message_id", &self.message_id)
            .field("action", &self.action)
            .field("kind", &self.kind)
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Result of looking up a reply's message id
pub enum Lookup<C> {
    /// Live call, removed from the table for dispatch
    Found(PendingCall<C>),

    /// Call that was already answered, cancelled, or expired
    AlreadyAnswered,

    /// Call sent without a callback; its reply has nowhere to go
    Untracked,

    /// Id this session never issued, or one that aged out of history
    Unknown,
}

/// Bounded FIFO set of message ids
struct IdWindow {
    order: VecDeque<MessageId>,
    members: HashSet<MessageId>,
    capacity: usize,
}

impl IdWindow {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    fn insert(&mut self, message_id: MessageId) {
        if self.capacity == 0 || !self.members.insert(message_id.clone()) {
            return;
        }
        self.order.push_back(message_id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.members.remove(&old);
            }
        }
    }

    fn contains(&self, message_id: &MessageId) -> bool {
        self.members.contains(message_id)
    }
}

/// Pending calls keyed by message id
///
/// Ids that leave the table are remembered in a bounded window so a late or
/// duplicate reply can be told apart from a genuine desync. Fire-and-forget
/// ids get a window of their own, so a burst of them never evicts an
/// answered id.
pub struct CorrelationTable<C> {
    pending: HashMap<MessageId, PendingCall<C>>,
    answered: IdWindow,
    untracked: IdWindow,
}

impl<C> CorrelationTable<C> {
    pub fn new(history: usize) -> Self {
        Self::with_untracked_history(history, history)
    }

    pub fn with_untracked_history(history: usize, untracked_history: usize) -> Self {
        Self {
            pending: HashMap::new(),
            answered: IdWindow::new(history),
            untracked: IdWindow::new(untracked_history),
        }
    }

    pub fn insert(&mut self, call: PendingCall<C>) {
        debug!(message_id = %call.message_id, action = %call.action, "CorrelationTable::insert: called");
        self.pending.insert(call.message_id.clone(), call);
    }

    /// Record a call sent without a callback
    pub fn insert_untracked(&mut self, message_id: MessageId) {
        debug!(%message_id, "CorrelationTable::insert_untracked: called");
        self.untracked.insert(message_id);
    }

    /// Look up and remove the call a reply answers
    ///
    /// One-shot calls are marked answered immediately. Stream calls must be
    /// handed back through [`CorrelationTable::restore`] after dispatch.
    pub fn take(&mut self, message_id: &MessageId) -> Lookup<C> {
        match self.pending.remove(message_id) {
            Some(call) => {
                if call.kind == CallKind::OneShot {
                    self.remember(message_id.clone());
                }
                Lookup::Found(call)
            }
            None if self.answered.contains(message_id) => Lookup::AlreadyAnswered,
            None if self.untracked.contains(message_id) => Lookup::Untracked,
            None => Lookup::Unknown,
        }
    }

    /// Put a stream call back after its callback ran
    ///
    /// Skipped when the call was cancelled while it was out of the table.
    pub fn restore(&mut self, call: PendingCall<C>) {
        if call.kind != CallKind::Stream || self.answered.contains(&call.message_id) {
            return;
        }
        self.pending.insert(call.message_id.clone(), call);
    }

    /// Record an id whose replies should be ignored
    pub fn remember(&mut self, message_id: MessageId) {
        self.answered.insert(message_id);
    }

    /// Drop a call explicitly; later replies to it are ignored
    pub fn cancel(&mut self, message_id: &MessageId) -> bool {
        let removed = self.pending.remove(message_id).is_some();
        self.remember(message_id.clone());
        removed
    }

    /// Remove every call whose deadline has passed
    pub fn sweep(&mut self, now: Instant) -> Vec<PendingCall<C>> {
        let expired: Vec<MessageId> = self
            .pending
            .values()
            .filter(|call| call.deadline.is_some_and(|d| now >= d))
            .map(|call| call.message_id.clone())
            .collect();

        let mut calls = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(call) = self.pending.remove(&id) {
                self.remember(id);
                calls.push(call);
            }
        }
        calls
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().filter_map(|call| call.deadline).min()
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.pending.contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove all pending calls
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> MessageId {
        MessageId::from_string(s)
    }

    fn call(s: &str, kind: CallKind, deadline: Option<Instant>) -> PendingCall<&'static str> {
        PendingCall {
            message_id: id(s),
            action: "test".to_string(),
            kind,
            deadline,
            on_reply: "cb",
        }
    }

    #[test]
    fn test_one_shot_found_then_already_answered() {
        let mut table = CorrelationTable::new(16);
        table.insert(call("a", CallKind::OneShot, None));

        assert!(matches!(table.take(&id("a")), Lookup::Found(_)));
        assert!(table.is_empty());
        assert!(matches!(table.take(&id("a")), Lookup::AlreadyAnswered));
    }

    #[test]
    fn test_unknown_id() {
        let mut table: CorrelationTable<&str> = CorrelationTable::new(16);
        assert!(matches!(table.take(&id("never")), Lookup::Unknown));
    }

    #[test]
    fn test_stream_restored_after_dispatch() {
        let mut table = CorrelationTable::new(16);
        table.insert(call("s", CallKind::Stream, None));

        for _ in 0..3 {
            let Lookup::Found(found) = table.take(&id("s")) else {
                panic!("stream call missing");
            };
            table.restore(found);
        }
        assert!(table.contains(&id("s")));
    }

    #[test]
    fn test_stream_cancelled_during_dispatch_not_restored() {
        let mut table = CorrelationTable::new(16);
        table.insert(call("s", CallKind::Stream, None));

        let Lookup::Found(found) = table.take(&id("s")) else {
            panic!("stream call missing");
        };
        assert!(!table.cancel(&id("s")));
        table.restore(found);

        assert!(!table.contains(&id("s")));
        assert!(matches!(table.take(&id("s")), Lookup::AlreadyAnswered));
    }

    #[test]
    fn test_cancel() {
        let mut table = CorrelationTable::new(16);
        table.insert(call("a", CallKind::OneShot, None));
        assert!(table.cancel(&id("a")));
        assert!(!table.cancel(&id("a")));
        assert!(matches!(table.take(&id("a")), Lookup::AlreadyAnswered));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut table: CorrelationTable<&str> = CorrelationTable::new(2);
        table.remember(id("1"));
        table.remember(id("2"));
        table.remember(id("3"));

        assert!(matches!(table.take(&id("1")), Lookup::Unknown));
        assert!(matches!(table.take(&id("2")), Lookup::AlreadyAnswered));
        assert!(matches!(table.take(&id("3")), Lookup::AlreadyAnswered));
    }

    #[test]
    fn test_sweep_expired_only() {
        let now = Instant::now();
        let mut table = CorrelationTable::new(16);
        table.insert(call("old", CallKind::OneShot, Some(now)));
        table.insert(call("new", CallKind::OneShot, Some(now + Duration::from_secs(5))));
        table.insert(call("forever", CallKind::OneShot, None));

        assert_eq!(table.next_deadline(), Some(now));

        let expired = table.sweep(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].message_id, id("old"));
        assert_eq!(table.len(), 2);
        assert!(matches!(table.take(&id("old")), Lookup::AlreadyAnswered));
        assert_eq!(table.next_deadline(), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_untracked_reply_recognized() {
        let mut table: CorrelationTable<&str> = CorrelationTable::new(4);
        table.insert_untracked(id("ff"));
        assert!(table.is_empty());
        assert!(matches!(table.take(&id("ff")), Lookup::Untracked));
        assert!(matches!(table.take(&id("ff")), Lookup::Untracked));
    }

    #[test]
    fn test_untracked_burst_keeps_answered_window() {
        let mut table = CorrelationTable::with_untracked_history(4, 4);
        table.insert(call("a", CallKind::OneShot, None));
        assert!(matches!(table.take(&id("a")), Lookup::Found(_)));

        for n in 0..10 {
            table.insert_untracked(id(&format!("ff-{n}")));
        }

        assert!(matches!(table.take(&id("a")), Lookup::AlreadyAnswered));
        assert!(matches!(table.take(&id("ff-0")), Lookup::Unknown));
        assert!(matches!(table.take(&id("ff-9")), Lookup::Untracked));
    }

    #[test]
    fn test_clear_counts() {
        let mut table = CorrelationTable::new(4);
        table.insert(call("a", CallKind::OneShot, None));
        table.insert(call("b", CallKind::Stream, None));
        assert_eq!(table.clear(), 2);
        assert!(table.is_empty());
    }
}
