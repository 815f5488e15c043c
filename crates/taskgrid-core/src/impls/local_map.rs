//! LocalReplicatedMap - single-node ReplicatedMap on top of DashMap.
//!
//! DashMap shards its buckets, so concurrent callers touching different keys
//! do not contend on one lock.

use std::hash::Hash;

use dashmap::DashMap;

use crate::ports::ReplicatedMap;

pub struct LocalReplicatedMap<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, V>,
}

impl<K: Eq + Hash, V> LocalReplicatedMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Default for LocalReplicatedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReplicatedMap<K, V> for LocalReplicatedMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|v| v.value().clone())
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    fn replace(&self, key: &K, value: V) -> Option<V> {
        let mut slot = self.inner.get_mut(key)?;
        Some(std::mem::replace(slot.value_mut(), value))
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn keys(&self) -> Vec<K> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_only_touches_existing_keys() {
        let map: LocalReplicatedMap<&str, u32> = LocalReplicatedMap::new();
        assert_eq!(map.replace(&"a", 1), None);
        assert!(!map.contains_key(&"a"));

        map.put("a", 1);
        assert_eq!(map.replace(&"a", 2), Some(1));
        assert_eq!(map.get(&"a"), Some(2));
    }

    #[test]
    fn remove_and_len() {
        let map: LocalReplicatedMap<u32, u32> = LocalReplicatedMap::new();
        map.put(1, 10);
        map.put(2, 20);
        assert_eq!(map.len(), 2);
        assert_eq!(map.remove(&1), Some(10));
        assert_eq!(map.len(), 1);
        assert_eq!(map.keys(), vec![2]);
    }
}
