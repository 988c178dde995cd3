// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Region registry: resolves a request's routing context to a region handle,
//! validates leadership and epoch, and tracks in-flight references per region.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::proto::errorpb;
use crate::proto::kvrpcpb;
use crate::proto::metapb;

/// Whether a region holds transactional (MVCC) data.
///
/// The classification is fixed when the region is registered. Transactional
/// operations on a `Raw` region succeed trivially with an empty payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegionKind {
    Txn,
    Raw,
}

impl RegionKind {
    /// Classify a region by the first byte of its start key, following the
    /// upstream SQL layer's keyspace convention: record (`t`) and meta (`m`)
    /// ranges hold MVCC data, everything else is raw.
    pub fn classify(start_key: &[u8]) -> RegionKind {
        match start_key.first() {
            Some(b't') | Some(b'm') => RegionKind::Txn,
            _ => RegionKind::Raw,
        }
    }
}

/// A zero-waitable in-flight counter.
///
/// Readers and writers `add`/`done` around each request; the region destroy
/// path waits for the count to drain. Must stay decrementable after the
/// region has been unregistered.
struct RefCount {
    count: Mutex<u64>,
    zero: Condvar,
}

impl RefCount {
    fn new() -> RefCount {
        RefCount {
            count: Mutex::new(0),
            zero: Condvar::new(),
        }
    }

    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    fn wait_zero(&self) {
        let mut count = self.count.lock();
        while *count != 0 {
            self.zero.wait(&mut count);
        }
    }
}

/// A registered region: its metadata, leader peer, MVCC classification and
/// in-flight reference count.
pub struct RegionCtx {
    meta: metapb::Region,
    leader: metapb::Peer,
    kind: RegionKind,
    ref_count: RefCount,
}

impl RegionCtx {
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn start_key(&self) -> &[u8] {
        &self.meta.start_key
    }

    /// The exclusive end of the region's range; empty means unbounded.
    pub fn end_key(&self) -> &[u8] {
        &self.meta.end_key
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn is_txn(&self) -> bool {
        self.kind == RegionKind::Txn
    }

    fn epoch(&self) -> metapb::RegionEpoch {
        self.meta.region_epoch.clone().unwrap_or_default()
    }
}

/// A pinned reference to a region. The pin holds the region's refcount and
/// releases it on drop, so a region cannot be destroyed under an in-flight
/// request.
pub struct RegionPin {
    region: Arc<RegionCtx>,
}

impl RegionPin {
    fn new(region: Arc<RegionCtx>) -> RegionPin {
        region.ref_count.add();
        RegionPin { region }
    }
}

impl Deref for RegionPin {
    type Target = RegionCtx;

    fn deref(&self) -> &RegionCtx {
        &self.region
    }
}

impl Drop for RegionPin {
    fn drop(&mut self) {
        self.region.ref_count.done();
    }
}

/// The region registry. Safe to call concurrently; pins are independent.
#[derive(Default)]
pub struct RegionManager {
    regions: RwLock<HashMap<u64, Arc<RegionCtx>>>,
}

impl RegionManager {
    pub fn new() -> RegionManager {
        RegionManager::default()
    }

    /// Register a region with its leader peer and MVCC classification.
    /// Replaces any previous registration of the same id.
    pub fn add_region(&self, meta: metapb::Region, leader: metapb::Peer, kind: RegionKind) {
        let region = Arc::new(RegionCtx {
            meta,
            leader,
            kind,
            ref_count: RefCount::new(),
        });
        self.regions.write().insert(region.meta.id, region);
    }

    /// Resolve a request's routing context to a pinned region.
    ///
    /// Validates, in order: the region exists, the context's peer is the
    /// leader, and the context's epoch matches. The pin is taken while the
    /// registry lock is held, so a region observed here is counted before
    /// [`remove_region`](Self::remove_region) can begin draining it.
    pub fn get_region_from_ctx(
        &self,
        ctx: &kvrpcpb::Context,
    ) -> std::result::Result<RegionPin, errorpb::Error> {
        let regions = self.regions.read();
        let region = match regions.get(&ctx.region_id) {
            Some(region) => region,
            None => return Err(region_not_found(ctx.region_id)),
        };
        let peer = ctx.peer.clone().unwrap_or_default();
        if peer.id != region.leader.id {
            return Err(not_leader(region));
        }
        let epoch = ctx.region_epoch.clone().unwrap_or_default();
        if epoch != region.epoch() {
            return Err(epoch_not_match(region));
        }
        Ok(RegionPin::new(region.clone()))
    }

    /// Unregister a region and wait for its in-flight requests to drain.
    pub fn remove_region(&self, region_id: u64) {
        let region = self.regions.write().remove(&region_id);
        if let Some(region) = region {
            region.ref_count.wait_zero();
        }
    }
}

fn region_not_found(region_id: u64) -> errorpb::Error {
    errorpb::Error {
        message: format!("region {} not found", region_id),
        region_not_found: Some(errorpb::RegionNotFound { region_id }),
        ..Default::default()
    }
}

fn not_leader(region: &RegionCtx) -> errorpb::Error {
    errorpb::Error {
        message: format!("peer is not leader of region {}", region.id()),
        not_leader: Some(errorpb::NotLeader {
            region_id: region.id(),
            leader: Some(region.leader.clone()),
        }),
        ..Default::default()
    }
}

fn epoch_not_match(region: &RegionCtx) -> errorpb::Error {
    errorpb::Error {
        message: format!("stale epoch for region {}", region.id()),
        epoch_not_match: Some(errorpb::EpochNotMatch {
            current_regions: vec![region.meta.clone()],
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::mock;

    #[test]
    fn classify_by_start_key() {
        assert_eq!(RegionKind::classify(b"t\x00abc"), RegionKind::Txn);
        assert_eq!(RegionKind::classify(b"mMeta"), RegionKind::Txn);
        assert_eq!(RegionKind::classify(b"r"), RegionKind::Raw);
        assert_eq!(RegionKind::classify(b""), RegionKind::Raw);
    }

    #[test]
    fn lookup_validates_in_order() {
        let rm = mock::mock_region_manager();

        let mut ctx = mock::mock_context();
        ctx.region_id = 404;
        let err = rm.get_region_from_ctx(&ctx).err().unwrap();
        assert!(err.region_not_found.is_some());

        let mut ctx = mock::mock_context();
        ctx.peer = Some(metapb::Peer { id: 99, store_id: 1 });
        let err = rm.get_region_from_ctx(&ctx).err().unwrap();
        let not_leader = err.not_leader.unwrap();
        assert_eq!(not_leader.leader.unwrap().id, mock::TEST_PEER_ID);

        let mut ctx = mock::mock_context();
        ctx.region_epoch = Some(metapb::RegionEpoch {
            conf_ver: 1,
            version: 2,
        });
        let err = rm.get_region_from_ctx(&ctx).err().unwrap();
        assert!(err.epoch_not_match.is_some());

        let pin = rm.get_region_from_ctx(&mock::mock_context()).unwrap();
        assert_eq!(pin.id(), mock::TEST_REGION_ID);
        assert!(pin.is_txn());
    }

    #[test]
    fn remove_region_waits_for_pins() {
        let rm = Arc::new(mock::mock_region_manager());
        let pin = rm.get_region_from_ctx(&mock::mock_context()).unwrap();

        let rm2 = rm.clone();
        let handle = thread::spawn(move || {
            rm2.remove_region(mock::TEST_REGION_ID);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        drop(pin);
        handle.join().unwrap();

        let err = rm.get_region_from_ctx(&mock::mock_context()).err().unwrap();
        assert!(err.region_not_found.is_some());
    }
}
