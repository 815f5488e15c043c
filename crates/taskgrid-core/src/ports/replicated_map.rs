//! ReplicatedMap port - the key-value primitive every cache sits on.
//!
//! A cluster deployment backs this with a synchronously replicating map; a
//! single node uses `LocalReplicatedMap`. Callers must tolerate eventual
//! cross-node visibility and never rely on iteration being a snapshot of the
//! whole cluster.

pub trait ReplicatedMap<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or overwrite, returning the previous value.
    fn put(&self, key: K, value: V) -> Option<V>;

    /// Overwrite only if the key is present; returns the previous value.
    fn replace(&self, key: &K, value: V) -> Option<V>;

    fn remove(&self, key: &K) -> Option<V>;

    fn contains_key(&self, key: &K) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys held locally.
    fn keys(&self) -> Vec<K>;
}
