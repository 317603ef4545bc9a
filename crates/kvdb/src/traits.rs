//! Storage traits.
//!
//! Backends implement [`KvStore`]; everything above them (tables,
//! overlays, the consensus store) is written against the trait so that the
//! physical engine can be swapped.

use crate::StorageResult;
use std::sync::Arc;

/// A key and its value.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A batch of write operations to be applied atomically.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    /// Operations in this batch, applied in order.
    pub operations: Vec<WriteOperation>,
}

impl WriteBatch {
    /// Create a new empty write batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a put operation to the batch.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.operations.push(WriteOperation::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Add a delete operation to the batch.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.operations
            .push(WriteOperation::Delete { key: key.into() });
    }

    /// Returns true if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

/// A single write operation within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOperation {
    /// Insert or update a key-value pair.
    Put {
        /// Key to write.
        key: Vec<u8>,
        /// Value to write.
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key to delete.
        key: Vec<u8>,
    },
}

impl WriteOperation {
    /// The key the operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            WriteOperation::Put { key, .. } | WriteOperation::Delete { key } => key,
        }
    }
}

/// Ordered byte-key storage.
///
/// All implementations must be thread-safe (`Send + Sync`); writes through
/// `&self` rely on interior locking.
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key. Succeeds even if the key does not exist.
    fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Apply a batch of write operations atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>>;

    /// Check if a key exists.
    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Delete every entry whose key starts with `prefix`, in one batch.
    ///
    /// Returns the number of deleted entries.
    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize> {
        let mut batch = WriteBatch::new();
        for (key, _) in self.iter_prefix(prefix)? {
            batch.delete(key);
        }
        let deleted = batch.len();
        if deleted > 0 {
            self.write_batch(batch)?;
        }
        Ok(deleted)
    }
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        (**self).delete(key)
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        (**self).write_batch(batch)
    }

    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        (**self).iter_prefix(prefix)
    }

    fn has(&self, key: &[u8]) -> StorageResult<bool> {
        (**self).has(key)
    }
}
