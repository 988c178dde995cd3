// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Coprocessor messages (`coprocessor` package): pushed-down query fragments.

use crate::proto::errorpb;
use crate::proto::kvrpcpb;

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct KeyRange {
    #[prost(bytes = "vec", tag = "1")]
    pub start: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub end: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Request {
    #[prost(message, optional, tag = "1")]
    pub context: Option<kvrpcpb::Context>,
    /// Request type; see the `REQ_TYPE_*` constants in `crate::coprocessor`.
    #[prost(int64, tag = "2")]
    pub tp: i64,
    /// Type-specific payload (a serialized DAG or analyze request).
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub ranges: Vec<KeyRange>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Response {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub region_error: Option<errorpb::Error>,
    #[prost(message, optional, tag = "3")]
    pub locked: Option<kvrpcpb::LockInfo>,
    #[prost(string, tag = "4")]
    pub other_error: String,
}
