//! Sharded lock table: serialises work on one key without a global lock.
//!
//! The shard for a key is fixed by its hash, so no lock objects are created
//! lazily and there is no creation race. Two keys may share a shard; that
//! only costs contention, never correctness.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};

pub struct LockTable {
    shards: Vec<Mutex<()>>,
}

impl LockTable {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard_of<K: Hash>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Hold the guard only across in-memory mutation, never across `.await`.
    pub fn lock<K: Hash>(&self, key: &K) -> MutexGuard<'_, ()> {
        self.shards[self.shard_of(key)].lock()
    }

    pub fn shards(&self) -> usize {
        self.shards.len()
    }
}
