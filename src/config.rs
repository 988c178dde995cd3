// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::time::Duration;

use serde_derive::Deserialize;
use serde_derive::Serialize;

const DEFAULT_SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(300);
const DEFAULT_LATCH_SLOTS: usize = 256;

/// Node configuration.
///
/// The slow-request threshold can also be adjusted at runtime through
/// [`Server::set_slow_request_threshold`](crate::Server::set_slow_request_threshold).
/// The request-size cap is a compile-time constant and is not configurable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Requests slower than this log their event trace at warning level.
    pub slow_request_threshold: Duration,
    /// Number of hashed per-key latch slots in the MVCC store.
    pub latch_slots: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slow_request_threshold: DEFAULT_SLOW_REQUEST_THRESHOLD,
            latch_slots: DEFAULT_LATCH_SLOTS,
        }
    }
}
