//! Protocol wire types
//!
//! JSON structures exchanged across the component boundary:
//! - **Envelope:** every outbound call, carrying a correlation id
//! - **Inbound:** handshake, theme push, or correlated reply
//! - **Item:** host records streamed to and saved by the component

mod item;
mod messages;

pub use item::{APP_DATA_DOMAIN, Item};
pub use messages::{
    ACTION_REGISTERED, ACTION_THEMES, API_NAME, Envelope, Environment, InboundMessage, MessageId, OriginalRef,
    Permission, Registration, Reply,
};
