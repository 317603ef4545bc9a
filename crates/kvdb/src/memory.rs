//! In-memory backend.

use crate::traits::{KvPair, KvStore, WriteBatch, WriteOperation};
use crate::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A [`KvStore`] kept in an ordered map.
#[derive(Debug, Default)]
pub struct MemoryDb {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDb {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemoryDb {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut data = self.data.write();
        for op in batch.operations {
            match op {
                WriteOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                WriteOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let data = self.data.read();
        Ok(data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let db = MemoryDb::new();
        db.put(b"key1", b"value1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert!(db.has(b"key1").unwrap());

        db.delete(b"key1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), None);
        assert!(db.is_empty());
    }

    #[test]
    fn test_iter_prefix_is_ordered_and_bounded() {
        let db = MemoryDb::new();
        db.put(b"a/2", b"2").unwrap();
        db.put(b"a/1", b"1").unwrap();
        db.put(b"b/1", b"x").unwrap();
        db.put(b"a", b"root").unwrap();

        let keys: Vec<_> = db
            .iter_prefix(b"a/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a/1".to_vec(), b"a/2".to_vec()]);
    }

    #[test]
    fn test_delete_prefix() {
        let db = MemoryDb::new();
        db.put(b"e1/x", b"1").unwrap();
        db.put(b"e1/y", b"2").unwrap();
        db.put(b"e2/x", b"3").unwrap();

        assert_eq!(db.delete_prefix(b"e1/").unwrap(), 2);
        assert_eq!(db.len(), 1);
    }
}
