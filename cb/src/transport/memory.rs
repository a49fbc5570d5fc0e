//! In-process transport that records every posted frame

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::{OutboundFrame, PostedFrame, Transport};
use crate::error::BridgeError;
use crate::protocol::Envelope;

#[derive(Debug, Default)]
struct Inner {
    frames: Vec<PostedFrame>,
    failing: bool,
}

/// Shared frame buffer
///
/// Clones share the buffer: hand one clone to the session and inspect the
/// frames through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent posts fail
    pub fn set_failing(&self, failing: bool) {
        self.inner.borrow_mut().failing = failing;
    }

    /// All frames posted so far
    pub fn frames(&self) -> Vec<PostedFrame> {
        self.inner.borrow().frames.clone()
    }

    /// Remove and return all frames posted so far
    pub fn take(&self) -> Vec<PostedFrame> {
        std::mem::take(&mut self.inner.borrow_mut().frames)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Posted frames decoded back into envelopes
    ///
    /// Frames that do not decode are skipped.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.inner
            .borrow()
            .frames
            .iter()
            .filter_map(|f| f.message.to_value().ok())
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    /// Actions of the posted envelopes, in order
    pub fn actions(&self) -> Vec<String> {
        self.envelopes().into_iter().map(|e| e.action).collect()
    }
}

impl Transport for MemoryTransport {
    fn post(&mut self, frame: OutboundFrame, target_origin: &str) -> Result<(), BridgeError> {
        let mut inner = self.inner.borrow_mut();
        if inner.failing {
            return Err(BridgeError::Transport("memory transport set to fail".to_string()));
        }
        debug!(%target_origin, "MemoryTransport::post: called");
        inner.frames.push(PostedFrame {
            target_origin: target_origin.to_string(),
            message: frame,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_frames() {
        let transport = MemoryTransport::new();
        let mut handle = transport.clone();

        handle
            .post(OutboundFrame::Structured(json!({"action": "a"})), "https://host")
            .unwrap();

        assert_eq!(transport.len(), 1);
        assert_eq!(transport.frames()[0].target_origin, "https://host");
    }

    #[test]
    fn test_take_drains() {
        let mut transport = MemoryTransport::new();
        transport.post(OutboundFrame::Text("{}".to_string()), "o").unwrap();
        assert_eq!(transport.take().len(), 1);
        assert!(transport.is_empty());
    }

    #[test]
    fn test_failing_post() {
        let mut transport = MemoryTransport::new();
        transport.set_failing(true);
        let err = transport.post(OutboundFrame::Text("{}".to_string()), "o").unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert!(transport.is_empty());
    }
}
