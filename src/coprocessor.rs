// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! The coprocessor dispatch seam.
//!
//! The node only routes coprocessor requests; executing the pushed-down
//! query fragment is the handler's business. Handlers read data through the
//! request context's snapshot reader.

use crate::proto::coprocessor;
use crate::request_context::RequestCtx;

/// A DAG select request.
pub const REQ_TYPE_DAG: i64 = 103;
/// A statistics (analyze) request.
pub const REQ_TYPE_ANALYZE: i64 = 104;

/// Executes coprocessor request payloads on behalf of the server.
pub trait CopHandler: Send + Sync {
    fn handle_dag(
        &self,
        req_ctx: &mut RequestCtx<'_>,
        req: &coprocessor::Request,
    ) -> coprocessor::Response;

    fn handle_analyze(
        &self,
        req_ctx: &mut RequestCtx<'_>,
        req: &coprocessor::Request,
    ) -> coprocessor::Response;
}
