//! Debounced save coalescing
//!
//! Keystroke-rate save requests are merged into one pending batch and written
//! once the requests go quiet for the configured window. The coalescer is a
//! plain state machine driven by the caller's clock readings:
//!
//! ```text
//! Idle ──request──▶ Pending(deadline, batch) ──request──▶ Pending(deadline', batch ∪ items)
//!   ▲                        │
//!   └──poll ≥ deadline / flush / skip-debounce (batch handed back to caller)
//! ```
//!
//! Items are stamped with `updated_at` when the save is requested, not when
//! the batch is eventually written. An external update arriving mid-window is
//! then correctly recognized as older than the edit still waiting to go out.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::protocol::Item;

/// Hook run against the batch right before it is serialized
pub type PresaveHook = Box<dyn FnOnce(&mut [Item])>;

/// Items waiting to be written, plus the latest caller's hooks
pub struct PendingBatch<F> {
    items: Vec<Item>,
    on_flush: Option<F>,
    on_presave: Option<PresaveHook>,
}

impl<F> PendingBatch<F> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            on_flush: None,
            on_presave: None,
        }
    }

    /// Replace buffered items sharing an identity with incoming ones, keep the rest
    fn merge(&mut self, incoming: Vec<Item>) {
        self.items
            .retain(|buffered| !incoming.iter().any(|item| item.uuid == buffered.uuid));
        self.items.extend(incoming);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run the presave hook and hand back the final items and flush callback
    pub fn finish(mut self) -> (Vec<Item>, Option<F>) {
        if let Some(presave) = self.on_presave.take() {
            debug!(items = self.items.len(), "PendingBatch::finish: running presave");
            presave(&mut self.items);
        }
        (self.items, self.on_flush)
    }
}

impl<F> std::fmt::Debug for PendingBatch<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingBatch")
            .field("items", &self.items)
            .field("on_flush", &self.on_flush.is_some())
            .field("on_presave", &self.on_presave.is_some())
            .finish()
    }
}

#[derive(Debug)]
enum SaveState<F> {
    Idle,
    Pending { deadline: Instant, batch: PendingBatch<F> },
}

/// Debounce state machine for save requests
#[derive(Debug)]
pub struct SaveCoalescer<F> {
    delay: Duration,
    enabled: bool,
    state: SaveState<F>,
}

impl<F> SaveCoalescer<F> {
    /// Create a coalescer; with `enabled == false` every request flushes at once
    pub fn new(delay: Duration, enabled: bool) -> Self {
        debug!(?delay, enabled, "SaveCoalescer::new: called");
        Self {
            delay,
            enabled,
            state: SaveState::Idle,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Buffer a save request
    ///
    /// Returns the batch when it must be written right away (`skip_debounce`
    /// or coalescing disabled); otherwise the window restarts and `None` is
    /// returned.
    pub fn request(
        &mut self,
        mut items: Vec<Item>,
        on_flush: Option<F>,
        on_presave: Option<PresaveHook>,
        skip_debounce: bool,
        now: Instant,
        stamp: DateTime<Utc>,
    ) -> Option<PendingBatch<F>> {
        debug!(items = items.len(), skip_debounce, "SaveCoalescer::request: called");

        for item in &mut items {
            item.updated_at = Some(stamp);
        }

        let mut batch = match std::mem::replace(&mut self.state, SaveState::Idle) {
            SaveState::Idle => PendingBatch::empty(),
            SaveState::Pending { batch, .. } => batch,
        };
        batch.merge(items);
        batch.on_flush = on_flush;
        batch.on_presave = on_presave;

        if skip_debounce || !self.enabled {
            debug!(items = batch.len(), "SaveCoalescer::request: flushing immediately");
            return Some(batch);
        }

        let deadline = now + self.delay;
        debug!(items = batch.len(), "SaveCoalescer::request: window restarted");
        self.state = SaveState::Pending { deadline, batch };
        None
    }

    /// Hand back the batch if its window has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<PendingBatch<F>> {
        match &self.state {
            SaveState::Pending { deadline, .. } if now >= *deadline => self.flush(),
            _ => None,
        }
    }

    /// Hand back the pending batch regardless of its deadline
    pub fn flush(&mut self) -> Option<PendingBatch<F>> {
        match std::mem::replace(&mut self.state, SaveState::Idle) {
            SaveState::Idle => None,
            SaveState::Pending { batch, .. } => {
                debug!(items = batch.len(), "SaveCoalescer::flush: releasing batch");
                Some(batch)
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SaveState::Pending { .. })
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            SaveState::Idle => None,
            SaveState::Pending { deadline, .. } => Some(*deadline),
        }
    }

    /// Items currently buffered
    pub fn pending_items(&self) -> &[Item] {
        match &self.state {
            SaveState::Idle => &[],
            SaveState::Pending { batch, .. } => batch.items(),
        }
    }
}
