// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

//! Per-key latches serializing write operations.
//!
//! Keys hash into a fixed set of slots. An operation acquires the slots of
//! all its keys sorted and deduplicated, so any two operations take their
//! common slots in the same order and cannot deadlock. Reads do not latch.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use parking_lot::Mutex;
use parking_lot::MutexGuard;

pub(crate) struct Latches {
    slots: Vec<Mutex<()>>,
}

impl Latches {
    pub(crate) fn new(size: usize) -> Latches {
        Latches {
            slots: (0..size.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Acquire the latches covering `keys`, blocking until all are held.
    pub(crate) fn lock_keys<'k, I>(&self, keys: I) -> LatchGuard<'_>
    where
        I: IntoIterator<Item = &'k [u8]>,
    {
        let mut slots: Vec<usize> = keys.into_iter().map(|key| self.slot_of(key)).collect();
        slots.sort_unstable();
        slots.dedup();
        LatchGuard {
            _guards: slots.into_iter().map(|slot| self.slots[slot].lock()).collect(),
        }
    }

    fn slot_of(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.slots.len()
    }
}

/// Holds a set of latch slots; releases them on drop.
#[must_use]
pub(crate) struct LatchGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use std::time::Instant;

    use rand::seq::SliceRandom;
    use rand::thread_rng;

    use super::*;

    #[test]
    fn duplicate_keys_collapse() {
        let latches = Latches::new(64);
        let guard = latches.lock_keys([b"k".as_slice(), b"k".as_slice()]);
        assert_eq!(guard._guards.len(), 1);
    }

    #[test]
    fn conflicting_keys_serialize() {
        let latches = Arc::new(Latches::new(64));
        let guard = latches.lock_keys([b"a".as_slice()]);

        let latches2 = latches.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || {
            let _guard = latches2.lock_keys([b"a".as_slice(), b"b".as_slice()]);
            start.elapsed()
        });

        thread::sleep(Duration::from_millis(50));
        drop(guard);
        let waited = handle.join().unwrap();
        assert!(waited >= Duration::from_millis(40), "{waited:?}");
    }

    #[test]
    fn shuffled_key_orders_do_not_deadlock() {
        let latches = Arc::new(Latches::new(8));
        let keys: Vec<Vec<u8>> = (0..32u8).map(|i| vec![b'k', i]).collect();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latches = latches.clone();
                let mut keys = keys.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        keys.shuffle(&mut thread_rng());
                        let _guard = latches.lock_keys(keys.iter().map(|k| k.as_slice()));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
