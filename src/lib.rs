// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! The transactional core of a TiKV-compatible storage node.
//!
//! This crate implements the request dispatch layer and the MVCC store of a
//! key-value node speaking the Percolator-style two-phase-commit protocol:
//! Get/Scan/BatchGet reads with lock visibility checks, the
//! Prewrite/Commit/Cleanup/BatchRollback/ResolveLock transaction state
//! machine, ScanLock recovery probes, GC and DeleteRange maintenance, and a
//! coprocessor dispatch seam for pushed-down query fragments. Requests are
//! served against regions (key-range shards with an epoch and a leader)
//! resolved and validated by the [`RegionManager`].
//!
//! Transport framing is not this crate's business: a gRPC (or test) layer
//! above constructs the kvproto request messages (mirrored in [`proto`]) and
//! calls the matching [`Server`] method, which always returns a response
//! message. Failures travel inside the responses, as region errors or
//! key errors, the way TiKV clients expect them.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tikv_node::proto::kvrpcpb;
//! use tikv_node::proto::metapb;
//! use tikv_node::MvccStore;
//! use tikv_node::RegionKind;
//! use tikv_node::RegionManager;
//! use tikv_node::Server;
//!
//! let region_manager = Arc::new(RegionManager::new());
//! let leader = metapb::Peer { id: 11, store_id: 1 };
//! region_manager.add_region(
//!     metapb::Region {
//!         id: 1,
//!         start_key: b"t".to_vec(),
//!         end_key: b"u".to_vec(),
//!         region_epoch: Some(metapb::RegionEpoch { conf_ver: 1, version: 1 }),
//!         peers: vec![leader.clone()],
//!     },
//!     leader.clone(),
//!     RegionKind::Txn,
//! );
//! let server = Server::new(region_manager, Arc::new(MvccStore::new()));
//!
//! let resp = server.kv_get(kvrpcpb::GetRequest {
//!     context: Some(kvrpcpb::Context {
//!         region_id: 1,
//!         region_epoch: Some(metapb::RegionEpoch { conf_ver: 1, version: 1 }),
//!         peer: Some(leader),
//!         ..Default::default()
//!     }),
//!     key: b"tk".to_vec(),
//!     version: 10,
//! });
//! assert!(resp.region_error.is_none());
//! server.stop();
//! ```

pub mod coprocessor;
pub mod proto;

mod config;
mod errors;
#[cfg(test)]
mod mock;
mod mvcc;
mod region;
mod request_context;
mod server;
mod timestamp;

#[doc(inline)]
pub use crate::config::Config;
#[doc(inline)]
pub use crate::coprocessor::CopHandler;
#[doc(inline)]
pub use crate::errors::Error;
#[doc(inline)]
pub use crate::errors::LockedError;
#[doc(inline)]
pub use crate::errors::Result;
#[doc(inline)]
pub use crate::errors::WriteConflictError;
#[doc(inline)]
pub use crate::mvcc::DbReader;
#[doc(inline)]
pub use crate::mvcc::MvccStore;
#[doc(inline)]
pub use crate::mvcc::Pair;
#[doc(inline)]
pub use crate::region::RegionCtx;
#[doc(inline)]
pub use crate::region::RegionKind;
#[doc(inline)]
pub use crate::region::RegionManager;
#[doc(inline)]
pub use crate::region::RegionPin;
#[doc(inline)]
pub use crate::request_context::RequestCtx;
#[doc(inline)]
pub use crate::server::Server;
#[doc(inline)]
pub use crate::server::REQUEST_MAX_SIZE;
#[doc(inline)]
pub use crate::timestamp::compose_ts;
#[doc(inline)]
pub use crate::timestamp::extract_logical;
#[doc(inline)]
pub use crate::timestamp::extract_physical;
#[doc(inline)]
pub use crate::timestamp::physical_time_from_ts;
