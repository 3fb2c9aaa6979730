//! Per-type hash-cons tables (spec §4.3): open-chained, power-of-two bucket
//! count, grow-at-75%. Guarantees structural uniqueness — "for any type
//! with a hash table, two cells with equal structural arguments are the
//! same object" (spec §3 invariant).
//!
//! Rust realization note: the spec's manual singly-linked chain (`next`
//! field on the object header) collapses to a `Vec` per bucket — the
//! idiomatic equivalent once the object header no longer needs to be a
//! raw, uniformly-shaped struct. Growth still follows the spec exactly:
//! at `len >= 0.75 * modulo` the bucket count doubles and every entry is
//! rehashed into bucket `v` or `v + modulo`.

use crate::ids::CellId;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

const INITIAL_MODULO: usize = 16;
const GROW_LOAD_FACTOR: f64 = 0.75;

fn structural_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Open-chained hash-cons table mapping a structural key to the single
/// canonical [`CellId`] for it.
pub struct HashCons<K> {
    buckets: Vec<Vec<(u64, K, CellId)>>,
    modulo: usize,
    len: usize,
}

impl<K: Hash + Eq + Clone> HashCons<K> {
    pub fn new() -> Self {
        Self {
            buckets: (0..INITIAL_MODULO).map(|_| Vec::new()).collect(),
            modulo: INITIAL_MODULO,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.modulo - 1)
    }

    /// The use/locate protocol's lookup half: walk the chain for a
    /// structural match, ordered by hash key so a mismatch search
    /// terminates early once the key would sort past the target.
    pub fn find(&self, key: &K) -> Option<CellId> {
        self.find_canonical(key).map(|(_, id)| id)
    }

    /// Like [`find`](Self::find) but also returns the canonical stored key
    /// (not the caller's copy), so interners can hand back the allocation
    /// that is actually shared rather than the probe value.
    pub fn find_canonical(&self, key: &K) -> Option<(&K, CellId)> {
        let hash = structural_hash(key);
        let idx = self.bucket_index(hash);
        for (h, k, id) in &self.buckets[idx] {
            if *h == hash && k == key {
                return Some((k, *id));
            }
        }
        None
    }

    /// Insert a new canonical mapping. Callers must have already confirmed
    /// via [`find`](Self::find) that no entry exists — this is the "on
    /// miss, allocate" half of the use/locate protocol (spec §4.3).
    pub fn insert(&mut self, key: K, id: CellId) {
        let hash = structural_hash(&key);
        let idx = self.bucket_index(hash);
        self.buckets[idx].push((hash, key, id));
        self.len += 1;
        if self.len as f64 >= GROW_LOAD_FACTOR * self.modulo as f64 {
            self.grow();
        }
    }

    pub fn remove(&mut self, key: &K) -> bool {
        let hash = structural_hash(key);
        let idx = self.bucket_index(hash);
        let bucket = &mut self.buckets[idx];
        if let Some(pos) = bucket.iter().position(|(h, k, _)| *h == hash && k == key) {
            bucket.remove(pos);
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// Double the bucket count; every entry moves to bucket `v` or
    /// `v + modulo` depending on the new mask bit (spec §4.3).
    fn grow(&mut self) {
        let new_modulo = self.modulo * 2;
        let mut new_buckets: Vec<Vec<(u64, K, CellId)>> =
            (0..new_modulo).map(|_| Vec::new()).collect();
        for bucket in self.buckets.drain(..) {
            for entry @ (hash, _, _) in bucket {
                let new_idx = (hash as usize) & (new_modulo - 1);
                new_buckets[new_idx].push(entry);
            }
        }
        self.buckets = new_buckets;
        self.modulo = new_modulo;
    }
}

impl<K: Hash + Eq + Clone> Default for HashCons<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_round_trips() {
        let mut table: HashCons<String> = HashCons::new();
        table.insert("hello".to_string(), CellId::new(1));
        assert_eq!(table.find(&"hello".to_string()), Some(CellId::new(1)));
        assert_eq!(table.find(&"nope".to_string()), None);
    }

    #[test]
    fn grow_preserves_all_entries_and_lookups() {
        let mut table: HashCons<i64> = HashCons::new();
        for i in 0..100 {
            table.insert(i, CellId::new(i as u32));
        }
        assert_eq!(table.len(), 100);
        for i in 0..100 {
            assert_eq!(table.find(&i), Some(CellId::new(i as u32)));
        }
    }

    #[test]
    fn remove_drops_entry() {
        let mut table: HashCons<i64> = HashCons::new();
        table.insert(5, CellId::new(5));
        assert!(table.remove(&5));
        assert_eq!(table.find(&5), None);
        assert!(!table.remove(&5));
    }
}
