// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Transaction timestamp helpers.
//!
//! The version used in transactions is composed from a timestamp: the lower
//! 18 bits are the logical part, the higher bits are the physical part in
//! milliseconds since the Unix epoch.

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

const PHYSICAL_SHIFT_BITS: u32 = 18;
const LOGICAL_MASK: u64 = (1_u64 << PHYSICAL_SHIFT_BITS) - 1;

/// Create a transaction timestamp from its physical and logical parts.
///
/// This matches the oracle's encoding: `(physical_ms << 18) + logical`.
pub fn compose_ts(physical_ms: u64, logical: u64) -> u64 {
    (physical_ms << PHYSICAL_SHIFT_BITS) + logical
}

/// Extract the physical part (milliseconds since the Unix epoch) from a
/// transaction timestamp.
pub fn extract_physical(ts: u64) -> u64 {
    ts >> PHYSICAL_SHIFT_BITS
}

/// Extract the logical part from a transaction timestamp.
pub fn extract_logical(ts: u64) -> u64 {
    ts & LOGICAL_MASK
}

/// Convert a transaction timestamp to a `SystemTime`.
///
/// The logical part is ignored (millisecond precision only).
pub fn physical_time_from_ts(ts: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(extract_physical(ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_extract_roundtrip() {
        let ts = compose_ts(1_700_000_000_000, 42);
        assert_eq!(extract_physical(ts), 1_700_000_000_000);
        assert_eq!(extract_logical(ts), 42);
    }

    #[test]
    fn physical_time() {
        let ts = compose_ts(1_000, 7);
        assert_eq!(
            physical_time_from_ts(ts),
            UNIX_EPOCH + Duration::from_millis(1_000)
        );
    }
}
