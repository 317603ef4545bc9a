//! Integration tests for tables layered over flushable overlays

use poset_kvdb::{Flushable, KvStore, MemoryDb, Table, WriteBatch};
use std::sync::Arc;

fn create_layered_store() -> (Arc<MemoryDb>, Arc<Flushable<Arc<MemoryDb>>>) {
    let db = Arc::new(MemoryDb::new());
    let overlay = Arc::new(Flushable::new(db.clone()));
    (db, overlay)
}

#[test]
fn test_table_writes_stay_in_overlay_until_flush() {
    let (db, overlay) = create_layered_store();
    let table = Table::new(overlay.clone(), b"checkpoint/");

    table.put(b"c", b"1").unwrap();
    assert!(db.is_empty());
    assert_eq!(table.get(b"c").unwrap(), Some(b"1".to_vec()));

    overlay.flush().unwrap();
    assert_eq!(db.get(b"checkpoint/c").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_batch_through_table_is_atomic_in_overlay() {
    let (db, overlay) = create_layered_store();
    let table = Table::new(overlay.clone(), b"t/");

    let mut batch = WriteBatch::new();
    batch.put(b"a".to_vec(), b"1".to_vec());
    batch.put(b"b".to_vec(), b"2".to_vec());
    batch.delete(b"a".to_vec());
    table.write_batch(batch).unwrap();

    overlay.drop_not_flushed();
    assert!(table.iter_prefix(b"").unwrap().is_empty());
    assert!(db.is_empty());
}

#[test]
fn test_clearing_a_namespace_through_overlay() {
    let (db, overlay) = create_layered_store();
    let old_epoch = Table::new(overlay.clone(), b"e\x00\x00\x00\x01");
    let new_epoch = Table::new(overlay.clone(), b"e\x00\x00\x00\x02");

    old_epoch.put(b"roots/1", b"x").unwrap();
    old_epoch.put(b"roots/2", b"y").unwrap();
    overlay.flush().unwrap();

    assert_eq!(old_epoch.clear().unwrap(), 2);
    new_epoch.put(b"roots/1", b"z").unwrap();
    overlay.flush().unwrap();

    assert_eq!(db.len(), 1);
    assert!(old_epoch.get(b"roots/1").unwrap().is_none());
}

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::*;
    use poset_kvdb::{RocksDb, RocksDbConfig};
    use tempfile::TempDir;

    fn create_test_db() -> (RocksDb, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = RocksDbConfig {
            path: temp_dir.path().to_path_buf(),
            sync_writes: false,
            ..Default::default()
        };
        let db = RocksDb::open(config).unwrap();
        (db, temp_dir)
    }

    #[test]
    fn test_put_get_delete() {
        let (db, _temp_dir) = create_test_db();
        db.put(b"key1", b"value1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        db.delete(b"key1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), None);
    }

    #[test]
    fn test_prefix_iteration() {
        let (db, _temp_dir) = create_test_db();
        db.put(b"a/1", b"1").unwrap();
        db.put(b"a/2", b"2").unwrap();
        db.put(b"b/1", b"3").unwrap();

        let entries = db.iter_prefix(b"a/").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"a/1".to_vec());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        {
            let db = RocksDb::open_default(temp_dir.path()).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(b"k".to_vec(), b"v".to_vec());
            db.write_batch(batch).unwrap();
        }
        let db = RocksDb::open_default(temp_dir.path()).unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
