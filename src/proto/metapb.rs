// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Region metadata messages (`metapb` package).

/// The version of a region's key range and membership.
///
/// `version` is bumped by splits and merges, `conf_ver` by membership changes.
/// A request carrying an epoch that differs from the region's current one is
/// answered with an `EpochNotMatch` region error.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct RegionEpoch {
    #[prost(uint64, tag = "1")]
    pub conf_ver: u64,
    #[prost(uint64, tag = "2")]
    pub version: u64,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Peer {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub store_id: u64,
}

/// A contiguous key-range shard. The range is `[start_key, end_key)`; an
/// empty `end_key` means "to the end of the keyspace".
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Region {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub start_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub end_key: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub region_epoch: Option<RegionEpoch>,
    #[prost(message, repeated, tag = "5")]
    pub peers: Vec<Peer>,
}
