//! Pre-registration outbound queue

use std::collections::VecDeque;

use serde_json::Value;

use super::correlation::CallKind;

/// A call deferred because no session exists yet
///
/// No identifier is assigned here; one is generated when the call is finally
/// sent.
pub struct QueuedCall<C> {
    pub action: String,
    pub data: Option<Value>,
    pub on_reply: Option<C>,
    pub kind: CallKind,
}

impl<C> std::fmt::Debug for QueuedCall<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedCall")
            .field("action", &self.action)
            .field("data", &self.data)
            .field("on_reply", &self.on_reply.is_some())
            .field("kind", &self.kind)
            .finish()
    }
}

/// FIFO buffer of calls issued before registration
#[derive(Debug)]
pub struct OutboundQueue<C> {
    calls: VecDeque<QueuedCall<C>>,
}

impl<C> Default for OutboundQueue<C> {
    fn default() -> Self {
        Self { calls: VecDeque::new() }
    }
}

impl<C> OutboundQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: QueuedCall<C>) {
        self.calls.push_back(call);
    }

    /// Take every queued call in issue order, leaving the queue empty
    pub fn drain(&mut self) -> Vec<QueuedCall<C>> {
        self.calls.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|c| c.action.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn call(action: &str) -> QueuedCall<u32> {
        QueuedCall {
            action: action.to_string(),
            data: None,
            on_reply: None,
            kind: CallKind::OneShot,
        }
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = OutboundQueue::new();
        queue.push(call("a"));
        queue.push(call("b"));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    proptest! {
        #[test]
        fn prop_drain_preserves_issue_order(actions in proptest::collection::vec("[a-z-]{1,12}", 0..40)) {
            let mut queue = OutboundQueue::new();
            for action in &actions {
                queue.push(call(action));
            }

            let drained: Vec<String> = queue.drain().into_iter().map(|c| c.action).collect();
            prop_assert_eq!(drained, actions);
        }
    }
}
