// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use crate::errors::Result;
use crate::mvcc::store::key_range;
use crate::mvcc::value_at;
use crate::mvcc::MvccStore;
use crate::mvcc::Pair;

/// A snapshot-style reader over the MVCC store, scoped to one request.
///
/// Readers resolve committed versions only and never observe locks; the
/// dispatch layer runs the lock checks before the first read.
pub struct DbReader {
    store: Arc<MvccStore>,
}

impl DbReader {
    pub(crate) fn new(store: Arc<MvccStore>) -> DbReader {
        DbReader { store }
    }

    /// The value of the newest version with `commit_ts <= ts`, if any.
    pub fn get(&self, key: &[u8], ts: u64) -> Result<Option<Vec<u8>>> {
        let inner = self.store.inner_read();
        Ok(inner.writes.get(key).and_then(|history| value_at(history, ts)))
    }

    /// Per-key reads; keys with no visible version are omitted.
    pub fn batch_get(&self, keys: &[Vec<u8>], ts: u64) -> Vec<Pair> {
        let inner = self.store.inner_read();
        keys.iter()
            .filter_map(|key| {
                inner
                    .writes
                    .get(key)
                    .and_then(|history| value_at(history, ts))
                    .map(|value| Pair {
                        key: key.clone(),
                        value,
                        err: None,
                    })
            })
            .collect()
    }

    /// Up to `limit` visible pairs in `[start, end)`, in key order.
    pub fn scan(&self, start: &[u8], end: &[u8], limit: usize, ts: u64) -> Vec<Pair> {
        let inner = self.store.inner_read();
        let mut pairs = Vec::new();
        for (key, history) in inner.writes.range::<[u8], _>(key_range(start, end)) {
            if pairs.len() >= limit {
                break;
            }
            if let Some(value) = value_at(history, ts) {
                pairs.push(Pair {
                    key: key.clone(),
                    value,
                    err: None,
                });
            }
        }
        pairs
    }
}
