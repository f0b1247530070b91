//! Event and session identifiers

use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random fragment in generated ids
pub const RANDOM_FRAGMENT_LEN: usize = 9;

/// Length of the high-resolution timer fragment
pub const TIMER_FRAGMENT_LEN: usize = 6;

/// Render `value` in base 36
pub fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Random base-36 token of exactly `len` characters (at most 24)
pub fn random_token(len: usize) -> String {
    // A v4 uuid carries 122 random bits, enough for 23 full base-36 digits;
    // pad so short renderings still yield `len` chars.
    let rendered = to_base36(Uuid::new_v4().as_u128());
    let padded = format!("{:0>25}", rendered);
    padded[padded.len() - len.min(24)..].to_string()
}

/// Generates `{prefix}-{unix_ms}-{random}-{timer}` identifiers
#[derive(Debug, Clone)]
pub struct EventIdGenerator {
    origin: Instant,
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventIdGenerator {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// A fresh id. Collisions need the same millisecond, the same 9 random
    /// digits and the same timer reading.
    pub fn generate(&self, prefix: &str, now: DateTime<Utc>) -> String {
        format!(
            "{}-{}-{}-{}",
            prefix,
            now.timestamp_millis(),
            random_token(RANDOM_FRAGMENT_LEN),
            self.timer_fragment()
        )
    }

    fn timer_fragment(&self) -> String {
        let rendered = to_base36(self.origin.elapsed().as_nanos());
        let start = rendered.len().saturating_sub(TIMER_FRAGMENT_LEN);
        rendered[start..].to_string()
    }
}

/// Session key for a checkout activation
pub fn checkout_id(now: DateTime<Utc>) -> String {
    format!(
        "checkout-{}-{}",
        now.timestamp_millis(),
        random_token(RANDOM_FRAGMENT_LEN)
    )
}
