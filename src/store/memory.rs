//! In-memory ordered store

use std::collections::BTreeMap;
use std::ops::Bound;

use sha2::{Digest, Sha256};

use super::{prefix_end, KvPair, KvStore, StoreError};

/// Ordered in-memory key-value store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the store empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 over every (key, value) pair in key order. Two replicas hold
    /// the same ledger exactly when their digests match.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (key, value) in &self.entries {
            hasher.update((key.len() as u32).to_be_bytes());
            hasher.update(key);
            hasher.update((value.len() as u32).to_be_bytes());
            hasher.update(value);
        }
        hasher.finalize().into()
    }

    fn scan(&self, start: &[u8], end: Option<&[u8]>) -> Vec<KvPair> {
        let upper = match end {
            Some(end) => Bound::Excluded(end.to_vec()),
            None => Bound::Unbounded,
        };
        self.entries
            .range((Bound::Included(start.to_vec()), upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn prefix_entries(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        let end = prefix_end(prefix);
        Ok(self.scan(prefix, end.as_deref()))
    }

    fn reverse_prefix_entries_limit(&self, prefix: &[u8], limit: usize) -> Result<Vec<KvPair>, StoreError> {
        let upper = match prefix_end(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Ok(self
            .entries
            .range((Bound::Included(prefix.to_vec()), upper))
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn range_entries(&self, start: &[u8], end: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self.scan(start, Some(end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scan_both_directions() {
        let mut store = MemoryStore::new();
        store.set(&[1, 1], b"a").unwrap();
        store.set(&[1, 3], b"c").unwrap();
        store.set(&[1, 2], b"b").unwrap();
        store.set(&[2, 0], b"x").unwrap();

        let forward: Vec<_> = store.prefix_entries(&[1]).unwrap().into_iter().map(|(_, v)| v).collect();
        assert_eq!(forward, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let reverse: Vec<_> = store
            .reverse_prefix_entries(&[1])
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(reverse, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_bounded_reverse_scan() {
        let mut store = MemoryStore::new();
        for i in 0u8..6 {
            store.set(&[4, i], &[i]).unwrap();
        }
        store.set(&[5, 0], b"x").unwrap();

        let top: Vec<_> = store.reverse_prefix_entries_limit(&[4], 2).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(top, vec![vec![4, 5], vec![4, 4]]);
        assert_eq!(store.reverse_prefix_entries_limit(&[4], 10).unwrap().len(), 6);
        assert!(store.reverse_prefix_entries_limit(&[4], 0).unwrap().is_empty());
    }

    #[test]
    fn test_range_is_half_open() {
        let mut store = MemoryStore::new();
        for i in 0u8..5 {
            store.set(&[9, i], &[i]).unwrap();
        }
        let hits = store.range_entries(&[9, 1], &[9, 3]).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(store.range_entries(&[9, 3], &[9, 1]).unwrap().is_empty());
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut a = MemoryStore::new();
        let mut b = MemoryStore::new();
        a.set(b"k", b"v").unwrap();
        b.set(b"k", b"v").unwrap();
        assert_eq!(a.digest(), b.digest());

        b.set(b"k", b"w").unwrap();
        assert_ne!(a.digest(), b.digest());
    }
}
