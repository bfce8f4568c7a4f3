//! Cryptographically random identity generation.
//!
//! Ids are never derived from predictable counters. Each id mixes a base36
//! millisecond timestamp prefix (for human-debug ordering only) with the 122
//! bits of randomness from a `Uuid::new_v4`, comfortably over the 96-bit
//! minimum.

use chrono::Utc;
use uuid::Uuid;

fn to_base36(mut n: u128) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 alphabet is ascii")
}

/// Generate a new random id with the given short prefix, e.g. `task_`.
pub fn generate(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    format!("{prefix}{}_{}", to_base36(millis), Uuid::new_v4().simple())
}
