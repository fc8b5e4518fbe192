//! Persistent store backed by a sled tree

use std::path::Path;

use super::{KvPair, KvStore, StoreError, WriteOp};

/// Name of the sled tree holding the staking tables
pub const STAKING_TREE: &str = "staking";

/// Persistent key-value store on a `sled::Tree`
pub struct SledStore {
    tree: sled::Tree,
    /// Keeps the database open when this store owns it
    db: Option<sled::Db>,
}

impl SledStore {
    /// Open (or create) a database at `path` and use its staking tree
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let tree = db.open_tree(STAKING_TREE)?;
        Ok(Self { tree, db: Some(db) })
    }

    /// Open a throwaway database that is removed on drop
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(STAKING_TREE)?;
        Ok(Self { tree, db: Some(db) })
    }

    /// Use a tree of a database owned elsewhere
    pub fn from_tree(tree: sled::Tree) -> Self {
        Self { tree, db: None }
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.tree.flush()?;
        if let Some(ref db) = self.db {
            db.flush()?;
        }
        Ok(())
    }

    fn collect<I>(iter: I) -> Result<Vec<KvPair>, StoreError>
    where
        I: Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
    {
        iter.map(|item| {
            let (k, v) = item?;
            Ok((k.to_vec(), v.to_vec()))
        })
        .collect()
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn prefix_entries(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        Self::collect(self.tree.scan_prefix(prefix))
    }

    fn reverse_prefix_entries(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        Self::collect(self.tree.scan_prefix(prefix).rev())
    }

    fn reverse_prefix_entries_limit(&self, prefix: &[u8], limit: usize) -> Result<Vec<KvPair>, StoreError> {
        Self::collect(self.tree.scan_prefix(prefix).rev().take(limit))
    }

    fn range_entries(&self, start: &[u8], end: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        Self::collect(self.tree.range(start..end))
    }

    /// Applied with `Tree::apply_batch`, so a failure leaves the tree as it was
    fn write_batch(&mut self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for (key, value) in ops {
            match value {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }
}
