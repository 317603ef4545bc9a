//! RocksDB backend.
//!
//! Everything lives in the default column family; sub-tables are carved
//! out with key prefixes by [`crate::Table`].

use crate::traits::{KvPair, KvStore, WriteBatch, WriteOperation};
use crate::{StorageError, StorageResult};
use parking_lot::RwLock;
use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Database configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: PathBuf,
    /// Enable compression (LZ4)
    pub enable_compression: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
    /// Sync every batch to disk
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/poset"),
            enable_compression: true,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
            sync_writes: true,
        }
    }
}

/// RocksDB-backed [`KvStore`].
pub struct RocksDb {
    inner: DB,
    config: RocksDbConfig,
    /// Serializes batch writes
    write_lock: RwLock<()>,
}

impl RocksDb {
    /// Open or create a database.
    pub fn open(config: RocksDbConfig) -> StorageResult<Self> {
        info!(path = %config.path.display(), "opening database");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let db = DB::open(&opts, &config.path).map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(Self {
            inner: db,
            config,
            write_lock: RwLock::new(()),
        })
    }

    /// Open a database with default configuration at `path`.
    pub fn open_default<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::open(RocksDbConfig {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    /// The configuration the database was opened with.
    pub fn config(&self) -> &RocksDbConfig {
        &self.config
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }
}

impl KvStore for RocksDb {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner
            .get(key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let _guard = self.write_lock.read();
        self.inner
            .put_opt(key, value, &self.write_options())
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let _guard = self.write_lock.read();
        self.inner
            .delete_opt(key, &self.write_options())
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let _guard = self.write_lock.write();
        let ops = batch.len();
        let mut inner = rocksdb::WriteBatch::default();
        for op in batch.operations {
            match op {
                WriteOperation::Put { key, value } => inner.put(key, value),
                WriteOperation::Delete { key } => inner.delete(key),
            }
        }
        self.inner
            .write_opt(inner, &self.write_options())
            .map_err(|e| StorageError::Database(e.to_string()))?;
        debug!(ops, "batch written");
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KvPair>> {
        let mut entries = Vec::new();
        for item in self
            .inner
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StorageError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for RocksDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDb")
            .field("path", &self.config.path)
            .finish()
    }
}
