// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! The RPC dispatch surface.
//!
//! Every transactional handler runs the same preamble: size gate, request
//! context acquisition (a shutdown rejection becomes a retryable key error,
//! never a transport error), region-error short-circuit, and, for the
//! range-oriented operations, the region's MVCC classification. Store
//! results are translated into the client-facing error channels exactly
//! once, at this boundary.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;
use log::error;
use prost::Message;

use crate::config::Config;
use crate::coprocessor::CopHandler;
use crate::coprocessor::REQ_TYPE_ANALYZE;
use crate::coprocessor::REQ_TYPE_DAG;
use crate::errors::Error;
use crate::errors::Result;
use crate::mvcc::MvccStore;
use crate::mvcc::Pair;
use crate::proto::coprocessor;
use crate::proto::errorpb;
use crate::proto::kvrpcpb;
use crate::region::RegionManager;
use crate::request_context::RequestCtx;
use crate::request_context::TraceEvent;
use crate::timestamp::physical_time_from_ts;

/// Requests at or above this serialized size are rejected with a
/// `raft_entry_too_large` region error. The node has no raft log; the gate
/// stands in for TiKV's raft entry limit so clients see the same boundary.
pub const REQUEST_MAX_SIZE: usize = 6 * 1024 * 1024;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The storage node's request dispatcher.
///
/// Owns the MVCC store and the region registry, tracks in-flight requests,
/// and serves the transactional RPC surface until [`stop`](Server::stop).
pub struct Server {
    store: Arc<MvccStore>,
    region_manager: Arc<RegionManager>,
    cop_handler: Option<Arc<dyn CopHandler>>,
    ref_count: AtomicI64,
    stopped: AtomicBool,
    slow_request_threshold_ms: AtomicU64,
}

impl Server {
    pub fn new(region_manager: Arc<RegionManager>, store: Arc<MvccStore>) -> Server {
        Server::with_config(region_manager, store, &Config::default())
    }

    pub fn with_config(
        region_manager: Arc<RegionManager>,
        store: Arc<MvccStore>,
        config: &Config,
    ) -> Server {
        Server {
            store,
            region_manager,
            cop_handler: None,
            ref_count: AtomicI64::new(0),
            stopped: AtomicBool::new(false),
            slow_request_threshold_ms: AtomicU64::new(
                config.slow_request_threshold.as_millis() as u64
            ),
        }
    }

    /// Install the coprocessor executor. Without one, coprocessor requests
    /// answer with `other_error`.
    pub fn set_cop_handler(&mut self, handler: Arc<dyn CopHandler>) {
        self.cop_handler = Some(handler);
    }

    /// Adjust the slow-request threshold at runtime.
    pub fn set_slow_request_threshold(&self, threshold: Duration) {
        self.slow_request_threshold_ms
            .store(threshold.as_millis() as u64, Ordering::Release);
    }

    /// Reject new requests and wait for in-flight ones to drain.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        while self.ref_count.load(Ordering::Acquire) != 0 {
            thread::sleep(STOP_POLL_INTERVAL);
        }
    }

    pub(crate) fn store(&self) -> &Arc<MvccStore> {
        &self.store
    }

    pub(crate) fn region_manager(&self) -> &RegionManager {
        &self.region_manager
    }

    pub(crate) fn ref_count(&self) -> &AtomicI64 {
        &self.ref_count
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_threshold_ms.load(Ordering::Acquire))
    }

    pub fn kv_get(&self, req: kvrpcpb::GetRequest) -> kvrpcpb::GetResponse {
        let mut resp = kvrpcpb::GetResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_get") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = Some(key_error_of(&e));
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        ctx.trace(TraceEvent::ReadLock);
        if let Err(e) = self
            .store
            .check_keys_lock(req.version, std::slice::from_ref(&req.key))
        {
            resp.error = Some(key_error_of(&e));
            return resp;
        }
        ctx.trace(TraceEvent::ReadDb);
        match ctx.get_reader().get(&req.key, req.version) {
            Ok(Some(value)) => resp.value = value,
            Ok(None) => {}
            Err(e) => resp.error = Some(key_error_of(&e)),
        }
        resp
    }

    /// Scan `[start_key, region end)` at the request's version.
    ///
    /// The range end is always clipped to the region boundary; a client that
    /// wants more continues from the last returned key in a follow-up
    /// request against the next region.
    pub fn kv_scan(&self, req: kvrpcpb::ScanRequest) -> kvrpcpb::ScanResponse {
        let mut resp = kvrpcpb::ScanResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_scan") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.pairs = pairs_of(vec![error_pair(e)]);
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        if !ctx.is_txn_region() {
            return resp;
        }
        let end_key = ctx.region_end().to_vec();
        ctx.trace(TraceEvent::ReadLock);
        if let Err(e) = self
            .store
            .check_range_lock(req.version, &req.start_key, &end_key)
        {
            resp.pairs = pairs_of(vec![error_pair(e)]);
            return resp;
        }
        ctx.trace(TraceEvent::ReadDb);
        let pairs = ctx
            .get_reader()
            .scan(&req.start_key, &end_key, req.limit as usize, req.version);
        resp.pairs = pairs_of(pairs);
        resp
    }

    pub fn kv_prewrite(&self, req: kvrpcpb::PrewriteRequest) -> kvrpcpb::PrewriteResponse {
        let mut resp = kvrpcpb::PrewriteResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_prewrite") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.errors = vec![key_error_of(&e)];
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        let results = self.store.prewrite(
            &mut ctx,
            &req.mutations,
            &req.primary_lock,
            req.start_version,
            req.lock_ttl,
        );
        resp.errors = key_errors_of(results);
        resp
    }

    pub fn kv_commit(&self, req: kvrpcpb::CommitRequest) -> kvrpcpb::CommitResponse {
        let mut resp = kvrpcpb::CommitResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_commit") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = Some(key_error_of(&e));
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        if let Err(e) =
            self.store
                .commit(&mut ctx, &req.keys, req.start_version, req.commit_version)
        {
            resp.error = Some(key_error_of(&e));
        }
        resp
    }

    pub fn kv_cleanup(&self, req: kvrpcpb::CleanupRequest) -> kvrpcpb::CleanupResponse {
        let mut resp = kvrpcpb::CleanupResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_cleanup") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = Some(key_error_of(&e));
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        match self.store.cleanup(&mut ctx, &req.key, req.start_version) {
            Ok(()) => {}
            Err(Error::AlreadyCommitted { commit_ts }) => resp.commit_version = commit_ts,
            Err(e) => {
                error!("kv_cleanup failed: {}", e);
                resp.error = Some(key_error_of(&e));
            }
        }
        resp
    }

    pub fn kv_batch_get(&self, req: kvrpcpb::BatchGetRequest) -> kvrpcpb::BatchGetResponse {
        let mut resp = kvrpcpb::BatchGetResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_batch_get") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.pairs = pairs_of(vec![error_pair(e)]);
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        ctx.trace(TraceEvent::ReadLock);
        if let Err(e) = self.store.check_keys_lock(req.version, &req.keys) {
            resp.pairs = pairs_of(vec![error_pair(e)]);
            return resp;
        }
        ctx.trace(TraceEvent::ReadDb);
        let pairs = ctx.get_reader().batch_get(&req.keys, req.version);
        resp.pairs = pairs_of(pairs);
        resp
    }

    pub fn kv_batch_rollback(
        &self,
        req: kvrpcpb::BatchRollbackRequest,
    ) -> kvrpcpb::BatchRollbackResponse {
        let mut resp = kvrpcpb::BatchRollbackResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_batch_rollback") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = Some(key_error_of(&e));
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        if let Err(e) = self.store.rollback(&mut ctx, &req.keys, req.start_version) {
            resp.error = Some(key_error_of(&e));
        }
        resp
    }

    pub fn kv_scan_lock(&self, req: kvrpcpb::ScanLockRequest) -> kvrpcpb::ScanLockResponse {
        let mut resp = kvrpcpb::ScanLockResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_scan_lock") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = Some(key_error_of(&e));
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        debug!("kv_scan_lock");
        if !ctx.is_txn_region() {
            return resp;
        }
        match self.store.scan_lock(&mut ctx, req.max_version) {
            Ok(locks) => resp.locks = locks,
            Err(e) => resp.error = Some(key_error_of(&e)),
        }
        resp
    }

    pub fn kv_resolve_lock(
        &self,
        req: kvrpcpb::ResolveLockRequest,
    ) -> kvrpcpb::ResolveLockResponse {
        let mut resp = kvrpcpb::ResolveLockResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_resolve_lock") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = Some(key_error_of(&e));
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        if !ctx.is_txn_region() {
            return resp;
        }
        let region_id = ctx.region().map_or(0, |r| r.id());
        if !req.txn_infos.is_empty() {
            for txn_info in &req.txn_infos {
                debug!("kv_resolve_lock region:{} txn:{}", region_id, txn_info.txn);
                if let Err(e) = self.store.resolve_lock(&mut ctx, txn_info.txn, txn_info.status) {
                    error!("kv_resolve_lock failed: {}", e);
                    resp.error = Some(key_error_of(&e));
                    break;
                }
            }
        } else {
            debug!("kv_resolve_lock region:{} txn:{}", region_id, req.start_version);
            if let Err(e) =
                self.store
                    .resolve_lock(&mut ctx, req.start_version, req.commit_version)
            {
                error!("kv_resolve_lock failed: {}", e);
                resp.error = Some(key_error_of(&e));
            }
        }
        resp
    }

    pub fn kv_gc(&self, req: kvrpcpb::GcRequest) -> kvrpcpb::GcResponse {
        let mut resp = kvrpcpb::GcResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_gc") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = Some(key_error_of(&e));
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        debug!(
            "kv_gc safe_point: {:?}",
            physical_time_from_ts(req.safe_point)
        );
        if !ctx.is_txn_region() {
            return resp;
        }
        if let Err(e) = self.store.gc(&mut ctx, req.safe_point) {
            resp.error = Some(key_error_of(&e));
        }
        resp
    }

    pub fn kv_delete_range(
        &self,
        req: kvrpcpb::DeleteRangeRequest,
    ) -> kvrpcpb::DeleteRangeResponse {
        let mut resp = kvrpcpb::DeleteRangeResponse::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return resp;
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "kv_delete_range") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.error = e.to_string();
                return resp;
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return resp;
        }
        if !ctx.is_txn_region() {
            return resp;
        }
        if let Err(e) = self
            .store
            .delete_range(&mut ctx, &req.start_key, &req.end_key)
        {
            error!("kv_delete_range failed: {}", e);
            resp.error = e.to_string();
        }
        resp
    }

    /// Route a coprocessor request to the installed handler.
    ///
    /// An unknown request type is the one transport-level failure of the
    /// dispatch surface.
    pub fn coprocessor(&self, req: coprocessor::Request) -> Result<coprocessor::Response> {
        let mut resp = coprocessor::Response::default();
        if let Some(region_err) = check_request_size(req.encoded_len()) {
            resp.region_error = Some(region_err);
            return Ok(resp);
        }
        let mut ctx = match RequestCtx::new(self, req.context.as_ref(), "coprocessor") {
            Ok(ctx) => ctx,
            Err(e) => {
                resp.other_error = e.to_string();
                return Ok(resp);
            }
        };
        if let Some(region_err) = ctx.take_region_err() {
            resp.region_error = Some(region_err);
            return Ok(resp);
        }
        let handler = match &self.cop_handler {
            Some(handler) => handler,
            None => {
                resp.other_error = "no coprocessor handler installed".to_owned();
                return Ok(resp);
            }
        };
        match req.tp {
            REQ_TYPE_DAG => Ok(handler.handle_dag(&mut ctx, &req)),
            REQ_TYPE_ANALYZE => Ok(handler.handle_analyze(&mut ctx, &req)),
            tp => Err(Error::UnsupportedCopType { tp }),
        }
    }

    // Raw KV commands are not served by this node; they answer empty so
    // client probes succeed.

    pub fn raw_get(&self, _req: kvrpcpb::RawGetRequest) -> kvrpcpb::RawGetResponse {
        kvrpcpb::RawGetResponse::default()
    }

    pub fn raw_put(&self, _req: kvrpcpb::RawPutRequest) -> kvrpcpb::RawPutResponse {
        kvrpcpb::RawPutResponse::default()
    }

    pub fn raw_delete(&self, _req: kvrpcpb::RawDeleteRequest) -> kvrpcpb::RawDeleteResponse {
        kvrpcpb::RawDeleteResponse::default()
    }

    pub fn raw_scan(&self, _req: kvrpcpb::RawScanRequest) -> kvrpcpb::RawScanResponse {
        kvrpcpb::RawScanResponse::default()
    }

    pub fn raw_batch_get(
        &self,
        _req: kvrpcpb::RawBatchGetRequest,
    ) -> kvrpcpb::RawBatchGetResponse {
        kvrpcpb::RawBatchGetResponse::default()
    }

    pub fn raw_batch_put(
        &self,
        _req: kvrpcpb::RawBatchPutRequest,
    ) -> kvrpcpb::RawBatchPutResponse {
        kvrpcpb::RawBatchPutResponse::default()
    }

    pub fn raw_batch_delete(
        &self,
        _req: kvrpcpb::RawBatchDeleteRequest,
    ) -> kvrpcpb::RawBatchDeleteResponse {
        kvrpcpb::RawBatchDeleteResponse::default()
    }

    pub fn raw_batch_scan(
        &self,
        _req: kvrpcpb::RawBatchScanRequest,
    ) -> kvrpcpb::RawBatchScanResponse {
        kvrpcpb::RawBatchScanResponse::default()
    }

    pub fn raw_delete_range(
        &self,
        _req: kvrpcpb::RawDeleteRangeRequest,
    ) -> kvrpcpb::RawDeleteRangeResponse {
        kvrpcpb::RawDeleteRangeResponse::default()
    }

    // Region and debugger commands; splits happen outside this core.

    pub fn split_region(
        &self,
        _req: kvrpcpb::SplitRegionRequest,
    ) -> kvrpcpb::SplitRegionResponse {
        kvrpcpb::SplitRegionResponse::default()
    }

    pub fn mvcc_get_by_key(
        &self,
        _req: kvrpcpb::MvccGetByKeyRequest,
    ) -> kvrpcpb::MvccGetByKeyResponse {
        kvrpcpb::MvccGetByKeyResponse::default()
    }

    pub fn mvcc_get_by_start_ts(
        &self,
        _req: kvrpcpb::MvccGetByStartTsRequest,
    ) -> kvrpcpb::MvccGetByStartTsResponse {
        kvrpcpb::MvccGetByStartTsResponse::default()
    }

    // Inter-node streams (raft, snapshot, coprocessor streaming) are owned by
    // the transport layer; nothing to do here.

    pub fn raft(&self) {}

    pub fn snapshot(&self) {}

    pub fn coprocessor_stream(&self, _req: coprocessor::Request) {}
}

fn check_request_size(size: usize) -> Option<errorpb::Error> {
    if size >= REQUEST_MAX_SIZE {
        return Some(errorpb::Error {
            message: "raft entry is too large".to_owned(),
            raft_entry_too_large: Some(errorpb::RaftEntryTooLarge {
                region_id: 0,
                entry_size: size as u64,
            }),
            ..Default::default()
        });
    }
    None
}

/// Translate a store error into the client-facing key-error channels.
fn key_error_of(err: &Error) -> kvrpcpb::KeyError {
    let mut key_error = kvrpcpb::KeyError::default();
    match err {
        Error::KeyIsLocked(locked) => {
            key_error.locked = Some(kvrpcpb::LockInfo {
                primary_lock: locked.primary.clone(),
                lock_version: locked.start_ts,
                key: locked.key.clone(),
                lock_ttl: locked.ttl,
            });
        }
        Error::WriteConflict(_) | Error::Retryable { .. } | Error::AlreadyRolledBack { .. } => {
            key_error.retryable = err.to_string();
        }
        _ => key_error.abort = err.to_string(),
    }
    key_error
}

fn key_errors_of(results: Vec<Result<()>>) -> Vec<kvrpcpb::KeyError> {
    results
        .into_iter()
        .filter_map(|result| result.err())
        .map(|err| key_error_of(&err))
        .collect()
}

fn error_pair(err: Error) -> Pair {
    Pair {
        err: Some(err),
        ..Default::default()
    }
}

fn pairs_of(pairs: Vec<Pair>) -> Vec<kvrpcpb::KvPair> {
    pairs
        .into_iter()
        .map(|pair| match pair.err {
            None => kvrpcpb::KvPair {
                key: pair.key,
                value: pair.value,
                error: None,
            },
            Some(err) => kvrpcpb::KvPair {
                error: Some(key_error_of(&err)),
                ..Default::default()
            },
        })
        .collect()
}
