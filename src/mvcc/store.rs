// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;

use crate::errors::Error;
use crate::errors::Result;
use crate::errors::WriteConflictError;
use crate::mvcc::latch::Latches;
use crate::mvcc::DbReader;
use crate::mvcc::Lock;
use crate::mvcc::LockKind;
use crate::mvcc::Write;
use crate::mvcc::WriteKind;
use crate::proto::kvrpcpb;
use crate::request_context::RequestCtx;
use crate::request_context::TraceEvent;

const DEFAULT_LATCH_SLOTS: usize = 256;

/// The range `[start, end)` over byte-string keys; an empty `end` is
/// unbounded.
pub(super) fn key_range<'r>(start: &'r [u8], end: &'r [u8]) -> (Bound<&'r [u8]>, Bound<&'r [u8]>) {
    let hi = if end.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Excluded(end)
    };
    (Bound::Included(start), hi)
}

#[derive(Default)]
pub(super) struct StoreInner {
    pub(super) locks: BTreeMap<Vec<u8>, Lock>,
    pub(super) writes: BTreeMap<Vec<u8>, BTreeMap<u64, Write>>,
}

/// The in-memory MVCC store.
///
/// Write operations acquire per-key latches in canonical order before taking
/// the state lock, never the other way around. Reads take only the state
/// lock, so a read observes any lock installed before it started.
pub struct MvccStore {
    inner: RwLock<StoreInner>,
    latches: Latches,
}

impl Default for MvccStore {
    fn default() -> Self {
        MvccStore::new()
    }
}

impl MvccStore {
    pub fn new() -> MvccStore {
        MvccStore::with_latch_slots(DEFAULT_LATCH_SLOTS)
    }

    pub fn with_latch_slots(slots: usize) -> MvccStore {
        MvccStore {
            inner: RwLock::new(StoreInner::default()),
            latches: Latches::new(slots),
        }
    }

    /// Build a snapshot-style reader over this store.
    pub fn new_reader(self: Arc<Self>) -> DbReader {
        DbReader::new(self)
    }

    pub(super) fn inner_read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read()
    }

    /// Fail with a `locked` error if any of `keys` carries a lock visible at
    /// `ts`. Locks from transactions that started after `ts` do not block.
    pub fn check_keys_lock(&self, ts: u64, keys: &[Vec<u8>]) -> Result<()> {
        let inner = self.inner.read();
        for key in keys {
            if let Some(lock) = inner.locks.get(key) {
                if lock.start_ts <= ts {
                    return Err(lock.locked_err(key));
                }
            }
        }
        Ok(())
    }

    /// Range form of [`check_keys_lock`](Self::check_keys_lock).
    pub fn check_range_lock(&self, ts: u64, start: &[u8], end: &[u8]) -> Result<()> {
        let inner = self.inner.read();
        for (key, lock) in inner.locks.range::<[u8], _>(key_range(start, end)) {
            if lock.start_ts <= ts {
                return Err(lock.locked_err(key));
            }
        }
        Ok(())
    }

    /// Install a lock for every mutation, returning one result per mutation.
    ///
    /// Per key, either the lock is installed or an error is returned: a
    /// `locked` error when another transaction holds the key, a retryable
    /// write conflict when a record with `commit_ts >= start_ts` already
    /// exists (including this transaction's own rollback fence).
    pub fn prewrite(
        &self,
        req: &mut RequestCtx<'_>,
        mutations: &[kvrpcpb::Mutation],
        primary: &[u8],
        start_ts: u64,
        lock_ttl: u64,
    ) -> Vec<Result<()>> {
        let _latches = self
            .latches
            .lock_keys(mutations.iter().map(|m| m.key.as_slice()));
        req.trace(TraceEvent::AcquireLatches);
        let mut inner = self.inner.write();
        req.trace(TraceEvent::BeginWriteLock);
        let results = mutations
            .iter()
            .map(|m| Self::prewrite_key(&mut inner, m, primary, start_ts, lock_ttl))
            .collect();
        drop(inner);
        req.trace(TraceEvent::EndWriteLock);
        results
    }

    fn prewrite_key(
        inner: &mut StoreInner,
        mutation: &kvrpcpb::Mutation,
        primary: &[u8],
        start_ts: u64,
        lock_ttl: u64,
    ) -> Result<()> {
        if let Some(lock) = inner.locks.get(&mutation.key) {
            if lock.start_ts != start_ts {
                return Err(lock.locked_err(&mutation.key));
            }
            // This transaction already prewrote the key; treat the retry as
            // the same mutation.
            return Ok(());
        }
        if let Some(history) = inner.writes.get(&mutation.key) {
            if let Some((&conflict_ts, _)) = history.iter().next_back() {
                if conflict_ts >= start_ts {
                    return Err(Error::WriteConflict(WriteConflictError {
                        start_ts,
                        conflict_commit_ts: conflict_ts,
                        key: mutation.key.clone(),
                    }));
                }
            }
        }
        let kind = match LockKind::from_op(mutation.op) {
            Some(kind) => kind,
            None => return Err(Error::abort(format!("invalid mutation op {}", mutation.op))),
        };
        let value = (kind == LockKind::Put).then(|| mutation.value.clone());
        inner.locks.insert(
            mutation.key.clone(),
            Lock {
                primary: primary.to_vec(),
                start_ts,
                ttl: lock_ttl,
                kind,
                value,
            },
        );
        Ok(())
    }

    /// Replace each key's lock with a write record at `commit_ts`.
    ///
    /// Succeeds idempotently when the same commit already happened; fails
    /// retryably when the transaction was rolled back. Partial failure leaves
    /// earlier keys committed, which a retry resolves through idempotence.
    pub fn commit(
        &self,
        req: &mut RequestCtx<'_>,
        keys: &[Vec<u8>],
        start_ts: u64,
        commit_ts: u64,
    ) -> Result<()> {
        let _latches = self.latches.lock_keys(keys.iter().map(|k| k.as_slice()));
        req.trace(TraceEvent::AcquireLatches);
        let mut inner = self.inner.write();
        req.trace(TraceEvent::BeginWriteDb);
        for key in keys {
            Self::commit_key(&mut inner, key, start_ts, commit_ts)?;
        }
        req.trace(TraceEvent::InWriteDb);
        drop(inner);
        req.trace(TraceEvent::EndWriteDb);
        Ok(())
    }

    fn commit_key(
        inner: &mut StoreInner,
        key: &[u8],
        start_ts: u64,
        commit_ts: u64,
    ) -> Result<()> {
        match inner.locks.entry(key.to_vec()) {
            Entry::Occupied(entry) if entry.get().start_ts == start_ts => {
                let lock = entry.remove();
                inner.writes.entry(key.to_vec()).or_default().insert(
                    commit_ts,
                    Write {
                        start_ts,
                        kind: lock.kind.into(),
                        value: lock.value,
                    },
                );
                Ok(())
            }
            _ => {
                if let Some(history) = inner.writes.get(key) {
                    for (&ts, write) in history.iter().rev() {
                        if write.start_ts == start_ts {
                            return match write.kind {
                                WriteKind::Rollback => {
                                    Err(Error::AlreadyRolledBack { start_ts })
                                }
                                _ if ts == commit_ts => Ok(()),
                                _ => Err(Error::abort(format!(
                                    "txn {} already committed @{}",
                                    start_ts, ts
                                ))),
                            };
                        }
                    }
                }
                Err(Error::TxnLockNotFound { start_ts })
            }
        }
    }

    /// Roll back `start_ts` on each key. Idempotent; a key the transaction
    /// already committed stays intact and is skipped.
    pub fn rollback(
        &self,
        req: &mut RequestCtx<'_>,
        keys: &[Vec<u8>],
        start_ts: u64,
    ) -> Result<()> {
        let _latches = self.latches.lock_keys(keys.iter().map(|k| k.as_slice()));
        req.trace(TraceEvent::AcquireLatches);
        let mut inner = self.inner.write();
        req.trace(TraceEvent::BeginWriteLock);
        for key in keys {
            // A committed key stays committed; its rollback is a no-op.
            match Self::rollback_key(&mut inner, key, start_ts) {
                Ok(()) | Err(Error::AlreadyCommitted { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        drop(inner);
        req.trace(TraceEvent::EndWriteLock);
        Ok(())
    }

    fn rollback_key(inner: &mut StoreInner, key: &[u8], start_ts: u64) -> Result<()> {
        match inner.locks.entry(key.to_vec()) {
            Entry::Occupied(entry) if entry.get().start_ts == start_ts => {
                entry.remove();
                inner
                    .writes
                    .entry(key.to_vec())
                    .or_default()
                    .insert(start_ts, Write::rollback_marker(start_ts));
                Ok(())
            }
            _ => {
                if let Some(history) = inner.writes.get(key) {
                    for (&ts, write) in history.iter().rev() {
                        if write.start_ts == start_ts {
                            return match write.kind {
                                WriteKind::Rollback => Ok(()),
                                _ => Err(Error::AlreadyCommitted { commit_ts: ts }),
                            };
                        }
                    }
                }
                // Nothing known about the transaction on this key; leave a
                // marker so a late prewrite cannot sneak in below it.
                inner
                    .writes
                    .entry(key.to_vec())
                    .or_default()
                    .insert(start_ts, Write::rollback_marker(start_ts));
                Ok(())
            }
        }
    }

    /// Roll back a single key, used by `Cleanup`.
    ///
    /// `Err(AlreadyCommitted)` reports the commit timestamp of a transaction
    /// that won the race; the dispatch layer surfaces it through the
    /// response's `commit_version` field.
    pub fn cleanup(&self, req: &mut RequestCtx<'_>, key: &[u8], start_ts: u64) -> Result<()> {
        let _latches = self.latches.lock_keys(std::iter::once(key));
        req.trace(TraceEvent::AcquireLatches);
        let mut inner = self.inner.write();
        req.trace(TraceEvent::BeginWriteLock);
        let res = Self::rollback_key(&mut inner, key, start_ts);
        drop(inner);
        req.trace(TraceEvent::EndWriteLock);
        res
    }

    /// All locks with `start_ts <= max_ts` in the request's region, in key
    /// order.
    pub fn scan_lock(
        &self,
        req: &mut RequestCtx<'_>,
        max_ts: u64,
    ) -> Result<Vec<kvrpcpb::LockInfo>> {
        req.trace(TraceEvent::ReadLock);
        let inner = self.inner.read();
        let locks = inner
            .locks
            .range::<[u8], _>(key_range(req.region_start(), req.region_end()))
            .filter(|(_, lock)| lock.start_ts <= max_ts)
            .map(|(key, lock)| lock.lock_info(key))
            .collect();
        Ok(locks)
    }

    /// Resolve every lock of transaction `start_ts` within the request's
    /// region: commit at `commit_ts` when it is non-zero, roll back otherwise.
    pub fn resolve_lock(
        &self,
        req: &mut RequestCtx<'_>,
        start_ts: u64,
        commit_ts: u64,
    ) -> Result<()> {
        let keys: Vec<Vec<u8>> = {
            let inner = self.inner.read();
            inner
                .locks
                .range::<[u8], _>(key_range(req.region_start(), req.region_end()))
                .filter(|(_, lock)| lock.start_ts == start_ts)
                .map(|(key, _)| key.clone())
                .collect()
        };
        if keys.is_empty() {
            return Ok(());
        }
        let _latches = self.latches.lock_keys(keys.iter().map(|k| k.as_slice()));
        req.trace(TraceEvent::AcquireLatches);
        let mut inner = self.inner.write();
        req.trace(TraceEvent::BeginWriteDb);
        for key in &keys {
            // The lock may have been resolved since the scan; only touch keys
            // this transaction still holds.
            if !inner
                .locks
                .get(key)
                .is_some_and(|lock| lock.start_ts == start_ts)
            {
                continue;
            }
            if commit_ts > 0 {
                Self::commit_key(&mut inner, key, start_ts, commit_ts)?;
            } else {
                match Self::rollback_key(&mut inner, key, start_ts) {
                    Ok(()) | Err(Error::AlreadyCommitted { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        drop(inner);
        req.trace(TraceEvent::EndWriteDb);
        Ok(())
    }

    /// Collapse versions older than `safe_point` within the request's region,
    /// keeping the newest committed value still visible at `safe_point`.
    /// A tombstone anchor is dropped as well; locks are never touched.
    pub fn gc(&self, req: &mut RequestCtx<'_>, safe_point: u64) -> Result<()> {
        let start = req.region_start().to_vec();
        let end = req.region_end().to_vec();
        let mut inner = self.inner.write();
        req.trace(TraceEvent::BeginWriteDb);
        let mut emptied = Vec::new();
        for (key, history) in inner.writes.range_mut::<[u8], _>(key_range(&start, &end)) {
            let anchor = history
                .range(..=safe_point)
                .rev()
                .find(|(_, w)| matches!(w.kind, WriteKind::Put | WriteKind::Delete))
                .map(|(&ts, w)| (ts, w.kind));
            let keep = match anchor {
                Some((ts, WriteKind::Put)) => Some(ts),
                _ => None,
            };
            history.retain(|&ts, _| ts > safe_point || Some(ts) == keep);
            if history.is_empty() {
                emptied.push(key.clone());
            }
        }
        for key in emptied {
            inner.writes.remove(&key);
        }
        drop(inner);
        req.trace(TraceEvent::EndWriteDb);
        Ok(())
    }

    /// Unconditionally delete all locks and versions in `[start, end)`. Not
    /// MVCC-versioned; callers are responsible for ordering against readers.
    pub fn delete_range(
        &self,
        req: &mut RequestCtx<'_>,
        start: &[u8],
        end: &[u8],
    ) -> Result<()> {
        let mut inner = self.inner.write();
        req.trace(TraceEvent::BeginWriteDb);
        let locked: Vec<Vec<u8>> = inner
            .locks
            .range::<[u8], _>(key_range(start, end))
            .map(|(key, _)| key.clone())
            .collect();
        for key in locked {
            inner.locks.remove(&key);
        }
        let written: Vec<Vec<u8>> = inner
            .writes
            .range::<[u8], _>(key_range(start, end))
            .map(|(key, _)| key.clone())
            .collect();
        for key in written {
            inner.writes.remove(&key);
        }
        drop(inner);
        req.trace(TraceEvent::EndWriteDb);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::mock;
    use crate::proto::kvrpcpb::Mutation;
    use crate::proto::kvrpcpb::Op;
    use crate::server::Server;

    fn new_req(server: &Server) -> RequestCtx<'_> {
        RequestCtx::new(server, Some(&mock::mock_context()), "test").unwrap()
    }

    fn put(key: &[u8], value: &[u8]) -> Mutation {
        Mutation {
            op: Op::Put as i32,
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    fn del(key: &[u8]) -> Mutation {
        Mutation {
            op: Op::Del as i32,
            key: key.to_vec(),
            value: vec![],
        }
    }

    fn must_prewrite(server: &Server, mutations: Vec<Mutation>, pk: &[u8], start_ts: u64) {
        let mut req = new_req(server);
        let results = server
            .store()
            .prewrite(&mut req, &mutations, pk, start_ts, 3000);
        assert!(results.iter().all(|r| r.is_ok()), "{results:?}");
    }

    fn must_prewrite_err(server: &Server, mutations: Vec<Mutation>, pk: &[u8], start_ts: u64) -> Error {
        let mut req = new_req(server);
        let mut results = server
            .store()
            .prewrite(&mut req, &mutations, pk, start_ts, 3000);
        results.remove(0).unwrap_err()
    }

    fn must_commit(server: &Server, key: &[u8], start_ts: u64, commit_ts: u64) {
        let mut req = new_req(server);
        server
            .store()
            .commit(&mut req, &[key.to_vec()], start_ts, commit_ts)
            .unwrap();
    }

    fn must_commit_err(server: &Server, key: &[u8], start_ts: u64, commit_ts: u64) -> Error {
        let mut req = new_req(server);
        server
            .store()
            .commit(&mut req, &[key.to_vec()], start_ts, commit_ts)
            .unwrap_err()
    }

    fn must_rollback(server: &Server, key: &[u8], start_ts: u64) {
        let mut req = new_req(server);
        server
            .store()
            .rollback(&mut req, &[key.to_vec()], start_ts)
            .unwrap();
    }

    fn must_get(server: &Server, key: &[u8], ts: u64, expect: &[u8]) {
        let store = server.store();
        store.check_keys_lock(ts, &[key.to_vec()]).unwrap();
        let value = store.clone().new_reader().get(key, ts).unwrap();
        assert_eq!(value.as_deref(), Some(expect));
    }

    fn must_get_none(server: &Server, key: &[u8], ts: u64) {
        let store = server.store();
        store.check_keys_lock(ts, &[key.to_vec()]).unwrap();
        assert_eq!(store.clone().new_reader().get(key, ts).unwrap(), None);
    }

    fn must_get_locked(server: &Server, key: &[u8], ts: u64) -> Error {
        server
            .store()
            .check_keys_lock(ts, &[key.to_vec()])
            .unwrap_err()
    }

    #[test]
    fn txn_read_visibility() {
        let server = mock::mock_server();

        must_get_none(&server, b"tx", 1);
        must_prewrite(&server, vec![put(b"tx", b"x5")], b"tx", 5);
        must_get_none(&server, b"tx", 3);
        let err = must_get_locked(&server, b"tx", 7);
        assert!(matches!(err, Error::KeyIsLocked(_)), "{err}");

        must_commit(&server, b"tx", 5, 10);
        must_get_none(&server, b"tx", 3);
        must_get_none(&server, b"tx", 7);
        must_get(&server, b"tx", 13, b"x5");

        must_prewrite(&server, vec![del(b"tx")], b"tx", 15);
        must_commit(&server, b"tx", 15, 20);
        must_get(&server, b"tx", 17, b"x5");
        must_get_none(&server, b"tx", 23);
    }

    #[test]
    fn prewrite_conflicts() {
        let server = mock::mock_server();

        must_prewrite(&server, vec![put(b"tx", b"1")], b"tx", 5);
        // Locked by start_ts 5.
        let err = must_prewrite_err(&server, vec![put(b"tx", b"2")], b"tx", 6);
        assert!(matches!(err, Error::KeyIsLocked(_)), "{err}");
        // Same transaction retries fine.
        must_prewrite(&server, vec![put(b"tx", b"1")], b"tx", 5);

        must_commit(&server, b"tx", 5, 10);
        // Write conflict with the commit at ts 10.
        let err = must_prewrite_err(&server, vec![put(b"tx", b"2")], b"tx", 6);
        assert!(matches!(err, Error::WriteConflict(_)), "{err}");
        // A transaction starting after the commit proceeds.
        must_prewrite(&server, vec![put(b"tx", b"2")], b"tx", 12);
    }

    #[test]
    fn prewrite_batch_reports_per_key() {
        let server = mock::mock_server();
        must_prewrite(&server, vec![put(b"ta", b"1")], b"ta", 5);

        let mut req = new_req(&server);
        let results = server.store().prewrite(
            &mut req,
            &[put(b"ta", b"x"), put(b"tb", b"y")],
            b"ta",
            6,
            3000,
        );
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }

    #[test]
    fn commit_is_idempotent() {
        let server = mock::mock_server();
        must_prewrite(&server, vec![put(b"tx", b"v")], b"tx", 10);
        must_commit(&server, b"tx", 10, 15);
        must_commit(&server, b"tx", 10, 15);
        must_get(&server, b"tx", 16, b"v");
    }

    #[test]
    fn commit_failures() {
        let server = mock::mock_server();

        // Never prewritten.
        let err = must_commit_err(&server, b"tx", 1, 2);
        assert!(matches!(err, Error::TxnLockNotFound { start_ts: 1 }), "{err}");

        must_prewrite(&server, vec![put(b"tx", b"v")], b"tx", 5);
        // start_ts mismatch does not steal the lock.
        let err = must_commit_err(&server, b"tx", 4, 6);
        assert!(matches!(err, Error::TxnLockNotFound { start_ts: 4 }), "{err}");

        must_rollback(&server, b"tx", 5);
        let err = must_commit_err(&server, b"tx", 5, 6);
        assert!(matches!(err, Error::AlreadyRolledBack { start_ts: 5 }), "{err}");
    }

    #[test]
    fn rollback_is_idempotent_and_fences() {
        let server = mock::mock_server();

        must_prewrite(&server, vec![put(b"tx", b"v")], b"tx", 5);
        must_rollback(&server, b"tx", 5);
        must_rollback(&server, b"tx", 5);
        must_get_none(&server, b"tx", 20);

        // The marker fences a late prewrite at the same start_ts.
        let err = must_prewrite_err(&server, vec![put(b"tx", b"v")], b"tx", 5);
        assert!(matches!(err, Error::WriteConflict(_)), "{err}");
        // A fresh transaction is unaffected.
        must_prewrite(&server, vec![put(b"tx", b"v")], b"tx", 10);
        must_rollback(&server, b"tx", 10);

        // Rolling back an unknown transaction fences it, too.
        must_rollback(&server, b"ty", 30);
        let err = must_prewrite_err(&server, vec![put(b"ty", b"v")], b"ty", 30);
        assert!(matches!(err, Error::WriteConflict(_)), "{err}");
    }

    #[test]
    fn rollback_of_committed_txn_is_noop() {
        let server = mock::mock_server();
        must_prewrite(&server, vec![put(b"tx", b"v")], b"tx", 5);
        must_commit(&server, b"tx", 5, 10);

        // The committed data stays intact; the rollback succeeds as a no-op.
        must_rollback(&server, b"tx", 5);
        must_rollback(&server, b"tx", 5);
        must_get(&server, b"tx", 15, b"v");

        // A committed key does not abort the rest of the batch.
        must_prewrite(&server, vec![put(b"ty", b"w")], b"ty", 5);
        let mut req = new_req(&server);
        server
            .store()
            .rollback(&mut req, &[b"tx".to_vec(), b"ty".to_vec()], 5)
            .unwrap();
        must_get(&server, b"tx", 15, b"v");
        must_get_none(&server, b"ty", 15);
    }

    #[test]
    fn cleanup_reports_commit_ts() {
        let server = mock::mock_server();

        // Live lock: cleanup rolls it back.
        must_prewrite(&server, vec![put(b"tx", b"v")], b"tx", 5);
        let mut req = new_req(&server);
        server.store().cleanup(&mut req, b"tx", 5).unwrap();
        let err = must_commit_err(&server, b"tx", 5, 7);
        assert!(matches!(err, Error::AlreadyRolledBack { .. }), "{err}");
        must_get_none(&server, b"tx", 9);

        // Committed transaction: cleanup reports the commit_ts.
        must_prewrite(&server, vec![put(b"ty", b"v")], b"ty", 5);
        must_commit(&server, b"ty", 5, 7);
        let mut req = new_req(&server);
        let err = server.store().cleanup(&mut req, b"ty", 5).unwrap_err();
        assert!(matches!(err, Error::AlreadyCommitted { commit_ts: 7 }), "{err}");

        // Already rolled back: cleanup succeeds.
        let mut req = new_req(&server);
        server.store().cleanup(&mut req, b"tx", 5).unwrap();
    }

    #[test]
    fn scan_lock_orders_and_filters() {
        let server = mock::mock_server();
        must_prewrite(&server, vec![put(b"tc", b"1")], b"tc", 20);
        must_prewrite(&server, vec![put(b"ta", b"1")], b"ta", 10);
        must_prewrite(&server, vec![put(b"tb", b"1")], b"tb", 30);

        let mut req = new_req(&server);
        let locks = server.store().scan_lock(&mut req, 20).unwrap();
        let keys: Vec<&[u8]> = locks.iter().map(|l| l.key.as_slice()).collect();
        assert_eq!(keys, vec![b"ta".as_slice(), b"tc".as_slice()]);
        assert_eq!(locks[0].lock_version, 10);
        assert_eq!(locks[0].lock_ttl, 3000);
    }

    #[test]
    fn resolve_lock_commits_or_rolls_back() {
        let server = mock::mock_server();
        must_prewrite(
            &server,
            vec![put(b"ta", b"1"), put(b"tb", b"2")],
            b"ta",
            10,
        );

        let mut req = new_req(&server);
        server.store().resolve_lock(&mut req, 10, 20).unwrap();
        must_get(&server, b"ta", 25, b"1");
        must_get(&server, b"tb", 25, b"2");

        // Applying the same resolution again is a no-op.
        let mut req = new_req(&server);
        server.store().resolve_lock(&mut req, 10, 20).unwrap();
        must_get(&server, b"ta", 25, b"1");

        must_prewrite(&server, vec![put(b"tc", b"3")], b"tc", 30);
        let mut req = new_req(&server);
        server.store().resolve_lock(&mut req, 30, 0).unwrap();
        must_get_none(&server, b"tc", 40);
        let err = must_commit_err(&server, b"tc", 30, 35);
        assert!(matches!(err, Error::AlreadyRolledBack { .. }), "{err}");
    }

    #[test]
    fn gc_keeps_newest_visible_version() {
        let server = mock::mock_server();
        must_prewrite(&server, vec![put(b"tx", b"a")], b"tx", 5);
        must_commit(&server, b"tx", 5, 10);
        must_prewrite(&server, vec![put(b"tx", b"b")], b"tx", 15);
        must_commit(&server, b"tx", 15, 20);

        let mut req = new_req(&server);
        server.store().gc(&mut req, 22).unwrap();
        must_get(&server, b"tx", 25, b"b");
        // The version at commit_ts 10 is gone.
        assert_eq!(
            server
                .store()
                .inner_read()
                .writes
                .get(b"tx".as_slice())
                .unwrap()
                .len(),
            1
        );

        // A tombstone anchor disappears entirely.
        must_prewrite(&server, vec![del(b"tx")], b"tx", 25);
        must_commit(&server, b"tx", 25, 30);
        let mut req = new_req(&server);
        server.store().gc(&mut req, 35).unwrap();
        assert!(server
            .store()
            .inner_read()
            .writes
            .get(b"tx".as_slice())
            .is_none());

        // Locks survive GC.
        must_prewrite(&server, vec![put(b"ty", b"v")], b"ty", 40);
        let mut req = new_req(&server);
        server.store().gc(&mut req, 50).unwrap();
        let mut req = new_req(&server);
        assert_eq!(server.store().scan_lock(&mut req, 50).unwrap().len(), 1);
    }

    #[test]
    fn delete_range_is_unconditional() {
        let server = mock::mock_server();
        must_prewrite(&server, vec![put(b"ta", b"1")], b"ta", 5);
        must_commit(&server, b"ta", 5, 10);
        must_prewrite(&server, vec![put(b"tb", b"2")], b"tb", 15);
        must_prewrite(&server, vec![put(b"tz", b"3")], b"tz", 15);

        let mut req = new_req(&server);
        server
            .store()
            .delete_range(&mut req, b"ta", b"tc")
            .unwrap();

        must_get_none(&server, b"ta", 20);
        must_get_none(&server, b"tb", 20);
        // Outside the range, the lock is untouched.
        let err = must_get_locked(&server, b"tz", 20);
        assert!(matches!(err, Error::KeyIsLocked(_)), "{err}");
    }

    proptest! {
        // Two transactions over disjoint keys commit to the same final state
        // regardless of how their prewrites and commits interleave.
        #[test]
        fn disjoint_txns_serialize(
            a_val in proptest::collection::vec(any::<u8>(), 0..64),
            b_val in proptest::collection::vec(any::<u8>(), 0..64),
            a_first in any::<bool>(),
        ) {
            let server = mock::mock_server();
            let (first, second) = if a_first {
                ((b"ta", &a_val, 10, 20), (b"tb", &b_val, 11, 21))
            } else {
                ((b"tb", &b_val, 11, 21), (b"ta", &a_val, 10, 20))
            };

            for (key, value, start_ts, _) in [first, second] {
                must_prewrite(&server, vec![put(key, value)], key, start_ts);
            }
            for (key, _, start_ts, commit_ts) in [second, first] {
                must_commit(&server, key, start_ts, commit_ts);
            }

            must_get(&server, b"ta", 30, &a_val);
            must_get(&server, b"tb", 30, &b_val);
        }
    }
}
