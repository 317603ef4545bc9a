//! Named sub-tables.

use crate::traits::{KvPair, KvStore, WriteBatch, WriteOperation};
use crate::StorageResult;

/// A view of a store restricted to keys under a fixed prefix.
///
/// Keys passed to and returned from a table are relative to the prefix.
#[derive(Debug, Clone)]
pub struct Table<S> {
    inner: S,
    prefix: Vec<u8>,
}

impl<S: KvStore> Table<S> {
    /// Creates a table over `inner` for keys starting with `prefix`.
    pub fn new(inner: S, prefix: impl AsRef<[u8]>) -> Self {
        Self {
            inner,
            prefix: prefix.as_ref().to_vec(),
        }
    }

    /// The table prefix.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Removes every entry of the table. Returns the number of deleted entries.
    pub fn clear(&self) -> StorageResult<usize> {
        self.inner.delete_prefix(&self.prefix)
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

impl<S: KvStore> KvStore for Table<S> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(&self.full_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.inner.put(&self.full_key(key), value)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.inner.delete(&self.full_key(key))
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut prefixed = WriteBatch::new();
        for op in batch.operations {
            match op {
                WriteOperation::Put { key, value } => prefixed.put(self.full_key(&key), value),
                WriteOperation::Delete { key } => prefixed.delete(self.full_key(&key)),
            }
        }
        self.inner.write_batch(prefixed)
    }

    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let strip = self.prefix.len();
        Ok(self
            .inner
            .iter_prefix(&self.full_key(prefix))?
            .into_iter()
            .map(|(key, value)| (key[strip..].to_vec(), value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDb;
    use std::sync::Arc;

    #[test]
    fn test_tables_are_isolated() {
        let db = Arc::new(MemoryDb::new());
        let roots = Table::new(db.clone(), b"r");
        let votes = Table::new(db.clone(), b"v");

        roots.put(b"1", b"root").unwrap();
        votes.put(b"1", b"vote").unwrap();

        assert_eq!(roots.get(b"1").unwrap(), Some(b"root".to_vec()));
        assert_eq!(votes.get(b"1").unwrap(), Some(b"vote".to_vec()));
        assert_eq!(db.get(b"r1").unwrap(), Some(b"root".to_vec()));
    }

    #[test]
    fn test_iter_prefix_strips_table_prefix() {
        let db = Arc::new(MemoryDb::new());
        let table = Table::new(db.clone(), b"t/");
        table.put(b"a1", b"1").unwrap();
        table.put(b"a2", b"2").unwrap();
        table.put(b"b1", b"3").unwrap();

        let entries = table.iter_prefix(b"a").unwrap();
        assert_eq!(
            entries,
            vec![
                (b"a1".to_vec(), b"1".to_vec()),
                (b"a2".to_vec(), b"2".to_vec())
            ]
        );
        assert_eq!(table.iter_prefix(b"").unwrap().len(), 3);
    }

    #[test]
    fn test_nested_tables_and_clear() {
        let db = Arc::new(MemoryDb::new());
        let epoch = Table::new(db.clone(), b"e1/");
        let roots = Table::new(epoch.clone(), b"roots/");
        roots.put(b"x", b"1").unwrap();
        db.put(b"e2/roots/x", b"2").unwrap();

        assert_eq!(db.get(b"e1/roots/x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(epoch.clear().unwrap(), 1);
        assert_eq!(db.len(), 1);
    }
}
