//! Key-value storage for the staking ledger
//!
//! The ledger only needs ordered byte keys: point reads and writes, plus
//! forward and reverse scans over a key prefix. Three backends:
//! - [`MemoryStore`]: ordered in-memory map, used by tests and simulations
//! - [`SledStore`]: a `sled::Tree` on disk
//! - [`CacheStore`]: copy-on-write buffer over another store; `write()`
//!   commits as one batch, dropping it discards
//!
//! Table layout and key encoding live in [`keys`].

mod cache;
pub mod keys;
mod memory;
mod sled_store;

pub use cache::CacheStore;
pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// A key/value pair returned from a scan
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A buffered write: `Some(value)` sets the key, `None` deletes it
pub type WriteOp = (Vec<u8>, Option<Vec<u8>>);

/// Ordered key-value store
pub trait KvStore {
    /// Read a value
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a value (no-op if absent)
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// All entries under `prefix`, ascending by key
    fn prefix_entries(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError>;

    /// All entries under `prefix`, descending by key
    fn reverse_prefix_entries(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        let mut entries = self.prefix_entries(prefix)?;
        entries.reverse();
        Ok(entries)
    }

    /// First `limit` entries under `prefix`, descending by key
    fn reverse_prefix_entries_limit(&self, prefix: &[u8], limit: usize) -> Result<Vec<KvPair>, StoreError> {
        let mut entries = self.reverse_prefix_entries(prefix)?;
        entries.truncate(limit);
        Ok(entries)
    }

    /// Entries with `start <= key < end`, ascending by key
    fn range_entries(&self, start: &[u8], end: &[u8]) -> Result<Vec<KvPair>, StoreError>;

    /// Apply a set of writes. Backends that can should apply them
    /// atomically: either every op lands or none does.
    fn write_batch(&mut self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        for (key, value) in ops {
            match value {
                Some(value) => self.set(&key, &value)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }

    /// Does the key exist?
    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
/// Returns `None` when no such key exists (prefix of all `0xff`).
pub(crate) fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
