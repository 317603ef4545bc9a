//! Write overlay with explicit commit.
//!
//! Writes to a [`Flushable`] are buffered in memory and visible to its own
//! reads. [`Flushable::flush`] hands them to the parent as one atomic batch;
//! [`Flushable::drop_not_flushed`] forgets them.

use crate::traits::{KvPair, KvStore, WriteBatch};
use crate::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::trace;

/// A buffered overlay over a parent store.
///
/// A pending value of `None` is a buffered delete.
#[derive(Debug)]
pub struct Flushable<S> {
    parent: S,
    pending: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<S: KvStore> Flushable<S> {
    /// Wraps `parent`.
    pub fn new(parent: S) -> Self {
        Self {
            parent,
            pending: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of buffered operations.
    pub fn not_flushed_count(&self) -> usize {
        self.pending.read().len()
    }

    /// Commits buffered operations to the parent in one batch.
    pub fn flush(&self) -> StorageResult<()> {
        let mut pending = self.pending.write();
        if pending.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for (key, value) in pending.iter() {
            match value {
                Some(value) => batch.put(key.clone(), value.clone()),
                None => batch.delete(key.clone()),
            }
        }
        trace!(ops = batch.len(), "flushing overlay");
        self.parent.write_batch(batch)?;
        pending.clear();
        Ok(())
    }

    /// Discards buffered operations.
    pub fn drop_not_flushed(&self) {
        let mut pending = self.pending.write();
        if !pending.is_empty() {
            trace!(ops = pending.len(), "dropping overlay");
            pending.clear();
        }
    }

    /// The parent store.
    pub fn parent(&self) -> &S {
        &self.parent
    }
}

impl<S: KvStore> KvStore for Flushable<S> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(value) = self.pending.read().get(key) {
            return Ok(value.clone());
        }
        self.parent.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.pending
            .write()
            .insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.pending.write().insert(key.to_vec(), None);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut pending = self.pending.write();
        for op in batch.operations {
            match op {
                crate::WriteOperation::Put { key, value } => {
                    pending.insert(key, Some(value));
                }
                crate::WriteOperation::Delete { key } => {
                    pending.insert(key, None);
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.iter_prefix(prefix)?.into_iter().collect();
        let pending = self.pending.read();
        for (key, value) in pending
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}
