//! # Poset KV Storage
//!
//! Ordered byte-key storage used by the consensus engine:
//!
//! - [`KvStore`] - the storage trait: point reads and writes, atomic
//!   batches and ordered prefix iteration
//! - [`MemoryDb`] - an in-memory backend
//! - [`Table`] - a named sub-table, i.e. a key-prefixed view of a store
//! - [`Flushable`] - a write overlay whose changes are committed in one
//!   batch by [`Flushable::flush`] or thrown away by
//!   [`Flushable::drop_not_flushed`]
//! - `RocksDb` - a RocksDB backend, behind the `rocksdb` feature
//!
//! ## Example
//!
//! ```rust
//! use poset_kvdb::{Flushable, KvStore, MemoryDb, Table};
//! use std::sync::Arc;
//!
//! let db = Arc::new(MemoryDb::new());
//! let overlay = Arc::new(Flushable::new(db.clone()));
//! let roots = Table::new(overlay.clone(), b"roots/");
//!
//! roots.put(b"k", b"v").unwrap();
//! assert!(db.get(b"roots/k").unwrap().is_none());
//!
//! overlay.flush().unwrap();
//! assert_eq!(db.get(b"roots/k").unwrap(), Some(b"v".to_vec()));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod flushable;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;
pub mod table;
pub mod traits;

pub use flushable::Flushable;
pub use memory::MemoryDb;
#[cfg(feature = "rocksdb")]
pub use rocks::{RocksDb, RocksDbConfig};
pub use table::Table;
pub use traits::{KvPair, KvStore, WriteBatch, WriteOperation};

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend failed.
    #[error("database error: {0}")]
    Database(String),

    /// Data corruption was detected.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Returns the smallest key greater than every key starting with `prefix`,
/// or `None` if no such key exists (the prefix is all `0xff`).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}
