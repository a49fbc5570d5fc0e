//! Message identifier generation
//!
//! Identifiers are 128-bit random values rendered as v4 UUIDs. The OS
//! randomness source is used when it works; if it ever fails the generator
//! degrades, for the rest of the session, to a time-seeded PRNG. The fallback
//! is weaker and only meant to keep the session alive.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng, TryRngCore};
use tracing::warn;
use uuid::Builder;

use crate::protocol::MessageId;

/// Source of per-envelope correlation identifiers
#[derive(Debug, Default)]
pub struct IdGenerator {
    fallback: Option<StdRng>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start directly in degraded mode with a fixed seed
    pub fn with_fallback_seed(seed: u64) -> Self {
        Self {
            fallback: Some(StdRng::seed_from_u64(seed)),
        }
    }

    /// Whether the generator has fallen back to the seeded PRNG
    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn next_id(&mut self) -> MessageId {
        let mut bytes = [0u8; 16];

        if self.fallback.is_none() {
            match OsRng.try_fill_bytes(&mut bytes) {
                Ok(()) => return Self::render(bytes),
                Err(e) => {
                    warn!(error = %e, "OS randomness unavailable, falling back to time-seeded ids");
                    self.fallback = Some(StdRng::seed_from_u64(time_seed()));
                }
            }
        }

        if let Some(rng) = self.fallback.as_mut() {
            rng.fill_bytes(&mut bytes);
        }
        Self::render(bytes)
    }

    fn render(bytes: [u8; 16]) -> MessageId {
        MessageId::from_string(Builder::from_random_bytes(bytes).into_uuid().to_string())
    }
}

fn time_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    nanos ^ u64::from(std::process::id()).rotate_left(32)
}
