//! ComponentBridge - Host/Component Messaging Protocol
//!
//! ComponentBridge lets a sandboxed component exchange structured commands
//! with its host across a postMessage-style boundary. It handles the parts
//! that need real protocol design and leaves rendering to the embedder.
//!
//! # Core Concepts
//!
//! - **Handshake Gating**: Calls made before registration are queued and
//!   replayed in order once the host hands out a session key
//! - **Correlation**: Every envelope carries a fresh random id; replies are
//!   matched through a table, never by arrival order
//! - **Coalesced Saving**: Keystroke-rate saves are debounced into one write,
//!   stamped at request time so stale pushes can be rejected
//! - **Theme Reconciliation**: Stylesheet sets are diffed, never rebuilt
//!
//! # Modules
//!
//! - [`session`] - Protocol session, router, queue and correlation table
//! - [`coalescer`] - Debounced save state machine
//! - [`themes`] - Theme set reconciliation
//! - [`transport`] - Boundary message types and transports
//! - [`protocol`] - Wire types and the item model
//! - [`driver`] - Stdio bridge loop and script replay
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod clock;
pub mod coalescer;
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod session;
pub mod themes;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BridgeConfig, Config};
pub use error::{BridgeError, DESYNC_ALERT};
pub use protocol::{Envelope, Environment, InboundMessage, Item, MessageId, Permission};
pub use session::{ComponentSession, ReplyCallback, SessionMetrics, reply_once};
pub use themes::{ThemeDiff, ThemeReconciler, ThemeSink};
pub use transport::{InboundEvent, MemoryTransport, OutboundFrame, RawPayload, StdioTransport, Transport};
