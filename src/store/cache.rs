//! Copy-on-write write buffer over another store
//!
//! Reads fall through to the parent unless the key was written or deleted
//! in the buffer. Nothing reaches the parent until [`CacheStore::write`],
//! which hands the whole buffer to the parent as one batch.

use std::collections::BTreeMap;

use super::{prefix_end, KvPair, KvStore, StoreError, WriteOp};

/// Buffered view of a parent store
pub struct CacheStore<'a, S: KvStore> {
    parent: &'a mut S,
    /// `None` marks a deletion
    dirty: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: KvStore> CacheStore<'a, S> {
    /// Start buffering writes on top of `parent`
    pub fn new(parent: &'a mut S) -> Self {
        Self { parent, dirty: BTreeMap::new() }
    }

    /// Number of buffered writes and deletes
    pub fn pending_writes(&self) -> usize {
        self.dirty.len()
    }

    /// Flush the buffer into the parent as a single batch, in key order
    pub fn write(self) -> Result<(), StoreError> {
        let CacheStore { parent, dirty } = self;
        if dirty.is_empty() {
            return Ok(());
        }
        parent.write_batch(dirty.into_iter().collect())
    }

    /// Merge parent entries in `[start, end)` with the buffer, ascending
    fn merged(&self, parent_entries: Vec<KvPair>, start: &[u8], end: Option<&[u8]>) -> Vec<KvPair> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = parent_entries.into_iter().collect();
        let in_range = |key: &[u8]| key >= start && end.map_or(true, |end| key < end);
        for (key, value) in self.dirty.iter().filter(|(k, _)| in_range(k.as_slice())) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }
}

impl<'a, S: KvStore> KvStore for CacheStore<'a, S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.dirty.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.dirty.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.dirty.insert(key.to_vec(), None);
        Ok(())
    }

    fn prefix_entries(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        let parent_entries = self.parent.prefix_entries(prefix)?;
        let end = prefix_end(prefix);
        Ok(self.merged(parent_entries, prefix, end.as_deref()))
    }

    fn reverse_prefix_entries_limit(&self, prefix: &[u8], limit: usize) -> Result<Vec<KvPair>, StoreError> {
        let end = prefix_end(prefix);
        let in_prefix = |key: &[u8]| key >= prefix && end.as_deref().map_or(true, |end| key < end);
        // each buffered key can hide at most one parent entry
        let buffered = self.dirty.keys().filter(|k| in_prefix(k.as_slice())).count();
        let parent_entries = self.parent.reverse_prefix_entries_limit(prefix, limit.saturating_add(buffered))?;

        let mut merged = self.merged(parent_entries, prefix, end.as_deref());
        merged.reverse();
        merged.truncate(limit);
        Ok(merged)
    }

    fn range_entries(&self, start: &[u8], end: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let parent_entries = self.parent.range_entries(start, end)?;
        Ok(self.merged(parent_entries, start, Some(end)))
    }

    fn write_batch(&mut self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.dirty.extend(ops);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_cache_discards_on_drop() {
        let mut base = MemoryStore::new();
        base.set(b"a", b"1").unwrap();
        {
            let mut cache = CacheStore::new(&mut base);
            cache.set(b"a", b"2").unwrap();
            cache.set(b"b", b"3").unwrap();
            assert_eq!(cache.get(b"a").unwrap(), Some(b"2".to_vec()));
        }
        assert_eq!(base.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert!(base.get(b"b").unwrap().is_none());
    }

    #[test]
    fn test_cache_write_commits_sets_and_deletes() {
        let mut base = MemoryStore::new();
        base.set(b"a", b"1").unwrap();
        base.set(b"c", b"9").unwrap();

        let mut cache = CacheStore::new(&mut base);
        cache.delete(b"a").unwrap();
        cache.set(b"b", b"2").unwrap();
        assert_eq!(cache.pending_writes(), 2);
        cache.write().unwrap();

        assert!(base.get(b"a").unwrap().is_none());
        assert_eq!(base.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(base.get(b"c").unwrap(), Some(b"9".to_vec()));
    }

    #[test]
    fn test_cache_scans_merge_buffer() {
        let mut base = MemoryStore::new();
        base.set(&[1, 1], b"a").unwrap();
        base.set(&[1, 2], b"b").unwrap();

        let mut cache = CacheStore::new(&mut base);
        cache.delete(&[1, 1]).unwrap();
        cache.set(&[1, 3], b"c").unwrap();
        cache.set(&[2, 0], b"z").unwrap();

        let keys: Vec<_> = cache.prefix_entries(&[1]).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![vec![1, 2], vec![1, 3]]);

        let rev: Vec<_> = cache
            .reverse_prefix_entries(&[1])
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(rev, vec![vec![1, 3], vec![1, 2]]);
    }

    #[test]
    fn test_cache_bounded_reverse_scan() {
        let mut base = MemoryStore::new();
        for i in 1u8..=4 {
            base.set(&[1, i], &[i]).unwrap();
        }

        let mut cache = CacheStore::new(&mut base);
        cache.delete(&[1, 4]).unwrap();
        cache.delete(&[1, 3]).unwrap();
        cache.set(&[1, 9], b"new").unwrap();
        cache.set(&[2, 0], b"other").unwrap();

        let keys: Vec<_> = cache
            .reverse_prefix_entries_limit(&[1], 2)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![1, 9], vec![1, 2]]);
    }

    #[test]
    fn test_nested_cache() {
        let mut base = MemoryStore::new();
        {
            let mut outer = CacheStore::new(&mut base);
            {
                let mut inner = CacheStore::new(&mut outer);
                inner.set(b"k", b"v").unwrap();
                inner.write().unwrap();
            }
            assert_eq!(outer.get(b"k").unwrap(), Some(b"v".to_vec()));
            outer.write().unwrap();
        }
        assert_eq!(base.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
