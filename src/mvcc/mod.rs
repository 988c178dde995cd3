// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! The multi-version store: per-key locks, committed write records, and the
//! snapshot reader used by transactional reads.

mod latch;
mod reader;
mod store;

use std::collections::BTreeMap;

pub use self::reader::DbReader;
pub use self::store::MvccStore;

use crate::errors::Error;
use crate::errors::LockedError;
use crate::proto::kvrpcpb;
use crate::proto::kvrpcpb::Op;

/// What a pending lock will become when its transaction commits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockKind {
    Put,
    Delete,
    Lock,
}

impl LockKind {
    pub(crate) fn from_op(op: i32) -> Option<LockKind> {
        match op {
            x if x == Op::Put as i32 => Some(LockKind::Put),
            x if x == Op::Del as i32 => Some(LockKind::Delete),
            x if x == Op::Lock as i32 => Some(LockKind::Lock),
            _ => None,
        }
    }
}

/// A pending prewrite. At most one lock exists per key; the staged value
/// lives here until commit moves it into a write record.
#[derive(Clone, Debug)]
pub struct Lock {
    pub primary: Vec<u8>,
    pub start_ts: u64,
    pub ttl: u64,
    pub kind: LockKind,
    pub value: Option<Vec<u8>>,
}

impl Lock {
    pub(crate) fn lock_info(&self, key: &[u8]) -> kvrpcpb::LockInfo {
        kvrpcpb::LockInfo {
            primary_lock: self.primary.clone(),
            lock_version: self.start_ts,
            key: key.to_vec(),
            lock_ttl: self.ttl,
        }
    }

    pub(crate) fn locked_err(&self, key: &[u8]) -> Error {
        Error::KeyIsLocked(LockedError {
            key: key.to_vec(),
            primary: self.primary.clone(),
            start_ts: self.start_ts,
            ttl: self.ttl,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteKind {
    Put,
    Delete,
    Lock,
    Rollback,
}

impl From<LockKind> for WriteKind {
    fn from(kind: LockKind) -> WriteKind {
        match kind {
            LockKind::Put => WriteKind::Put,
            LockKind::Delete => WriteKind::Delete,
            LockKind::Lock => WriteKind::Lock,
        }
    }
}

/// A committed-or-rolled-back record, keyed by `(key, commit_ts)` in the
/// store. Rollback records are keyed by the transaction's own `start_ts` and
/// fence it from being prewritten again.
#[derive(Clone, Debug)]
pub struct Write {
    pub start_ts: u64,
    pub kind: WriteKind,
    pub value: Option<Vec<u8>>,
}

impl Write {
    pub(crate) fn rollback_marker(start_ts: u64) -> Write {
        Write {
            start_ts,
            kind: WriteKind::Rollback,
            value: None,
        }
    }
}

/// A key/value pair produced by a read, or the per-key error replacing it.
#[derive(Debug, Default)]
pub struct Pair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub err: Option<Error>,
}

/// Resolve the value visible at `ts` from a key's write history: the newest
/// Put or Delete with `commit_ts <= ts` decides, Lock and Rollback records
/// are skipped.
pub(crate) fn value_at(history: &BTreeMap<u64, Write>, ts: u64) -> Option<Vec<u8>> {
    history
        .range(..=ts)
        .rev()
        .find(|(_, w)| matches!(w.kind, WriteKind::Put | WriteKind::Delete))
        .and_then(|(_, w)| match w.kind {
            WriteKind::Put => Some(w.value.clone().unwrap_or_default()),
            _ => None,
        })
}
