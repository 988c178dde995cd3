// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Test fixtures: a server over one transactional and one raw region.

use std::sync::Arc;

use crate::mvcc::MvccStore;
use crate::proto::kvrpcpb;
use crate::proto::metapb;
use crate::region::RegionKind;
use crate::region::RegionManager;
use crate::server::Server;

pub(crate) const TEST_REGION_ID: u64 = 1;
pub(crate) const TEST_PEER_ID: u64 = 11;
pub(crate) const RAW_REGION_ID: u64 = 2;
pub(crate) const RAW_PEER_ID: u64 = 21;

fn region_meta(id: u64, start_key: &[u8], end_key: &[u8], peer_id: u64) -> metapb::Region {
    metapb::Region {
        id,
        start_key: start_key.to_vec(),
        end_key: end_key.to_vec(),
        region_epoch: Some(metapb::RegionEpoch {
            conf_ver: 1,
            version: 1,
        }),
        peers: vec![metapb::Peer {
            id: peer_id,
            store_id: 1,
        }],
    }
}

pub(crate) fn mock_region_manager() -> RegionManager {
    let region_manager = RegionManager::new();
    region_manager.add_region(
        region_meta(TEST_REGION_ID, b"t", b"u", TEST_PEER_ID),
        metapb::Peer {
            id: TEST_PEER_ID,
            store_id: 1,
        },
        RegionKind::classify(b"t"),
    );
    region_manager.add_region(
        region_meta(RAW_REGION_ID, b"r", b"s", RAW_PEER_ID),
        metapb::Peer {
            id: RAW_PEER_ID,
            store_id: 1,
        },
        RegionKind::classify(b"r"),
    );
    region_manager
}

pub(crate) fn mock_server() -> Server {
    Server::new(
        Arc::new(mock_region_manager()),
        Arc::new(MvccStore::new()),
    )
}

fn context_for(region_id: u64, peer_id: u64) -> kvrpcpb::Context {
    kvrpcpb::Context {
        region_id,
        region_epoch: Some(metapb::RegionEpoch {
            conf_ver: 1,
            version: 1,
        }),
        peer: Some(metapb::Peer {
            id: peer_id,
            store_id: 1,
        }),
        ..Default::default()
    }
}

/// A context routing to the transactional test region.
pub(crate) fn mock_context() -> kvrpcpb::Context {
    context_for(TEST_REGION_ID, TEST_PEER_ID)
}

/// A context routing to the raw (non-MVCC) test region.
pub(crate) fn raw_context() -> kvrpcpb::Context {
    context_for(RAW_REGION_ID, RAW_PEER_ID)
}
