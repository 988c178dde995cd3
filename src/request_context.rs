// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Per-request lifecycle state.
//!
//! A [`RequestCtx`] is created at RPC entry and finalized on drop, on every
//! exit path: it pairs the server's in-flight count and the region pin with
//! their releases, owns the lazily-built snapshot reader, and records the
//! event trace used for slow-request diagnostics.

use std::fmt;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use log::warn;

use crate::errors::Error;
use crate::errors::Result;
use crate::mvcc::DbReader;
use crate::proto::errorpb;
use crate::proto::kvrpcpb;
use crate::region::RegionCtx;
use crate::region::RegionPin;
use crate::server::Server;

/// The pre-registered trace event tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TraceEvent {
    ReadLock,
    ReadDb,
    BeginWriteLock,
    EndWriteLock,
    BeginWriteDb,
    InWriteDb,
    EndWriteDb,
    AcquireLatches,
    Finish,
}

impl TraceEvent {
    fn as_str(self) -> &'static str {
        match self {
            TraceEvent::ReadLock => ">RLock",
            TraceEvent::ReadDb => ">RDB",
            TraceEvent::BeginWriteLock => "<WLock",
            TraceEvent::EndWriteLock => ">WLock",
            TraceEvent::BeginWriteDb => "<WDB",
            TraceEvent::InWriteDb => "=WDB",
            TraceEvent::EndWriteDb => ">WDB",
            TraceEvent::AcquireLatches => ">Latch",
            TraceEvent::Finish => ">Fin",
        }
    }
}

struct TraceItem {
    event: TraceEvent,
    since_start: Duration,
}

impl fmt::Display for TraceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.event.as_str(), self.since_start)
    }
}

/// Per-request scratch state; see the module docs.
pub struct RequestCtx<'a> {
    server: &'a Server,
    region: Option<RegionPin>,
    region_err: Option<errorpb::Error>,
    reader: Option<DbReader>,
    method: &'static str,
    start_time: Instant,
    traces: Vec<TraceItem>,
}

impl<'a> RequestCtx<'a> {
    /// Open a request against the server.
    ///
    /// The in-flight count is taken before the stopped flag is checked, so a
    /// concurrent [`Server::stop`] either observes this request or rejects
    /// it here. A region error does not fail creation: the context comes
    /// back with the error recorded and no region pin.
    pub(crate) fn new(
        server: &'a Server,
        ctx: Option<&kvrpcpb::Context>,
        method: &'static str,
    ) -> Result<RequestCtx<'a>> {
        server.ref_count().fetch_add(1, Ordering::AcqRel);
        if server.is_stopped() {
            server.ref_count().fetch_sub(1, Ordering::AcqRel);
            return Err(Error::retryable("server is closed"));
        }
        let default_ctx;
        let ctx = match ctx {
            Some(ctx) => ctx,
            None => {
                default_ctx = kvrpcpb::Context::default();
                &default_ctx
            }
        };
        let (region, region_err) = match server.region_manager().get_region_from_ctx(ctx) {
            Ok(pin) => (Some(pin), None),
            Err(err) => (None, Some(err)),
        };
        Ok(RequestCtx {
            server,
            region,
            region_err,
            reader: None,
            method,
            start_time: Instant::now(),
            traces: Vec::with_capacity(16),
        })
    }

    /// Take the region error computed during creation, if any.
    pub(crate) fn take_region_err(&mut self) -> Option<errorpb::Error> {
        self.region_err.take()
    }

    pub fn region(&self) -> Option<&RegionCtx> {
        self.region.as_deref()
    }

    pub(crate) fn is_txn_region(&self) -> bool {
        self.region.as_ref().is_some_and(|r| r.is_txn())
    }

    /// The region's exclusive range end; empty when unbounded or unresolved.
    pub(crate) fn region_end(&self) -> &[u8] {
        self.region.as_ref().map_or(&[], |r| r.end_key())
    }

    pub(crate) fn region_start(&self) -> &[u8] {
        self.region.as_ref().map_or(&[], |r| r.start_key())
    }

    /// The snapshot reader for this request, built on first use.
    ///
    /// For read-only requests this must only be called after all lock checks
    /// have passed.
    pub fn get_reader(&mut self) -> &DbReader {
        let server = self.server;
        self.reader
            .get_or_insert_with(|| server.store().clone().new_reader())
    }

    pub(crate) fn trace(&mut self, event: TraceEvent) {
        self.traces.push(TraceItem {
            event,
            since_start: self.start_time.elapsed(),
        });
    }
}

impl Drop for RequestCtx<'_> {
    fn drop(&mut self) {
        self.trace(TraceEvent::Finish);
        let elapsed = self
            .traces
            .last()
            .map(|t| t.since_start)
            .unwrap_or_default();
        if elapsed > self.server.slow_request_threshold() {
            let trace = self
                .traces
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            warn!("SLOW {} {}", self.method, trace);
        }
        self.reader = None;
        self.region = None;
        self.server.ref_count().fetch_sub(1, Ordering::AcqRel);
    }
}
