// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Hand-maintained mirrors of the kvproto messages this node serves.
//!
//! The structs use the same `#[derive(::prost::Message)]` form as the
//! generated kvproto bindings, so they stay wire-compatible and provide
//! `encoded_len()` for the request-size gate. They are trimmed to the fields
//! the node reads or populates; transport framing lives above this crate.

pub mod coprocessor;
pub mod errorpb;
pub mod kvrpcpb;
pub mod metapb;
