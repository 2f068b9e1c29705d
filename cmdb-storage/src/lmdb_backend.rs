//! LMDB-backed document store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to persist upgrade tables on
//! disk. Two named databases live in one environment:
//!
//! - `docs`: key `[table bytes][0x00][row: u64 BE]`, value is the JSON document.
//!   Row numbers come from a per-table counter in `rows`, so a table iterates
//!   in insertion order.
//! - `sequences`: key is the sequence name, value is the last handed-out
//!   value as `u64` LE.
//! - `rows`: key is the table name, value is its last row number as `u64` LE.
//!
//! Each trait call runs in its own LMDB transaction.

use std::path::Path;

use async_trait::async_trait;
use cmdb_core::{CmdbResult, ConfigError, StorageError, StoreConfig, UniqueId, UpgradeContext};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{decode_document, encode_document, Filter, Rdb};

/// Error type for opening the LMDB store.
#[derive(Debug, thiserror::Error)]
pub enum LmdbRdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected store settings.
    #[error("Invalid store configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<LmdbRdbError> for cmdb_core::CmdbError {
    fn from(e: LmdbRdbError) -> Self {
        match e {
            LmdbRdbError::Config(config) => cmdb_core::CmdbError::Config(config),
            other => cmdb_core::CmdbError::Storage(StorageError::Backend {
                reason: other.to_string(),
            }),
        }
    }
}

/// LMDB-backed implementation of [`Rdb`].
///
/// # Example
///
/// ```ignore
/// use cmdb_storage::{LmdbRdb, Rdb};
/// use cmdb_core::UpgradeContext;
///
/// let store = LmdbRdb::open("/var/lib/cmdb", 1024)?;
/// let ctx = UpgradeContext::background();
/// let id = store.next_sequence(&ctx, "cc_ObjectUnique").await?;
/// ```
pub struct LmdbRdb {
    env: Env,
    docs: Database<Bytes, Bytes>,
    sequences: Database<Bytes, Bytes>,
    rows: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for LmdbRdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbRdb")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbRdb {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `map_size_mb` - Maximum size of the environment in megabytes
    pub fn open<P: AsRef<Path>>(path: P, map_size_mb: usize) -> Result<Self, LmdbRdbError> {
        let map_size = StoreConfig {
            path: path.as_ref().to_path_buf(),
            map_size_mb,
        }
        .map_size_bytes()?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // never mapped concurrently with a different map size.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(3)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbRdbError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbRdbError::Transaction(e.to_string()))?;

        let docs: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("docs"))
            .map_err(|e| LmdbRdbError::DbOpen(e.to_string()))?;
        let sequences: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("sequences"))
            .map_err(|e| LmdbRdbError::DbOpen(e.to_string()))?;
        let rows: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("rows"))
            .map_err(|e| LmdbRdbError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbRdbError::Transaction(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), map_size_mb, "Opened LMDB store");

        Ok(Self {
            env,
            docs,
            sequences,
            rows,
        })
    }

    /// Open the store described by a [`StoreConfig`].
    pub fn from_config(config: &StoreConfig) -> Result<Self, LmdbRdbError> {
        Self::open(&config.path, config.map_size_mb)
    }

    fn table_prefix(table: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(table.len() + 1);
        prefix.extend_from_slice(table.as_bytes());
        prefix.push(0x00);
        prefix
    }

    fn row_key(table: &str, row: u64) -> Vec<u8> {
        let mut key = Self::table_prefix(table);
        key.extend_from_slice(&row.to_be_bytes());
        key
    }

    /// Increment and return the counter under `key` in `counters`.
    fn bump_counter(
        counters: Database<Bytes, Bytes>,
        wtxn: &mut RwTxn<'_>,
        key: &[u8],
    ) -> Result<u64, heed::Error> {
        let current = match counters.get(wtxn, key)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                u64::from_le_bytes(buf)
            }
            _ => 0,
        };
        let next = current + 1;
        counters.put(wtxn, key, &next.to_le_bytes())?;
        Ok(next)
    }

    fn read_table(&self, table: &str) -> Result<Vec<Value>, StorageError> {
        let find_failed = |reason: String| StorageError::FindFailed {
            table: table.to_string(),
            reason,
        };

        let rtxn = self.env.read_txn().map_err(|e| find_failed(e.to_string()))?;
        let prefix = Self::table_prefix(table);
        let iter = self.docs.iter(&rtxn).map_err(|e| find_failed(e.to_string()))?;

        let mut docs = Vec::new();
        for entry in iter {
            let (key, bytes) = entry.map_err(|e| find_failed(e.to_string()))?;
            if key.starts_with(&prefix) && key.len() == prefix.len() + 8 {
                let doc: Value = serde_json::from_slice(bytes).map_err(|e| {
                    StorageError::Serialization {
                        table: table.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    fn write_document(&self, table: &str, doc: &Value) -> Result<(), StorageError> {
        let insert_failed = |reason: String| StorageError::InsertFailed {
            table: table.to_string(),
            reason,
        };

        let bytes = serde_json::to_vec(doc).map_err(|e| StorageError::Serialization {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| insert_failed(e.to_string()))?;
        let row = Self::bump_counter(self.rows, &mut wtxn, table.as_bytes())
            .map_err(|e| insert_failed(e.to_string()))?;
        self.docs
            .put(&mut wtxn, &Self::row_key(table, row), &bytes)
            .map_err(|e| insert_failed(e.to_string()))?;
        wtxn.commit().map_err(|e| insert_failed(e.to_string()))
    }

    fn allocate(&self, sequence: &str) -> Result<UniqueId, StorageError> {
        let sequence_failed = |reason: String| StorageError::SequenceFailed {
            sequence: sequence.to_string(),
            reason,
        };

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| sequence_failed(e.to_string()))?;
        let value = Self::bump_counter(self.sequences, &mut wtxn, sequence.as_bytes())
            .map_err(|e| sequence_failed(e.to_string()))?;
        wtxn.commit().map_err(|e| sequence_failed(e.to_string()))?;
        Ok(value)
    }

    fn remove_column(&self, table: &str, column: &str) -> Result<usize, StorageError> {
        let drop_failed = |reason: String| StorageError::DropColumnFailed {
            table: table.to_string(),
            column: column.to_string(),
            reason,
        };

        let prefix = Self::table_prefix(table);
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| drop_failed(e.to_string()))?;

        let mut rewritten = Vec::new();
        {
            let iter = self.docs.iter(&wtxn).map_err(|e| drop_failed(e.to_string()))?;
            for entry in iter {
                let (key, bytes) = entry.map_err(|e| drop_failed(e.to_string()))?;
                if !key.starts_with(&prefix) || key.len() != prefix.len() + 8 {
                    continue;
                }
                let mut doc: Value =
                    serde_json::from_slice(bytes).map_err(|e| drop_failed(e.to_string()))?;
                let removed = doc
                    .as_object_mut()
                    .map(|obj| obj.remove(column).is_some())
                    .unwrap_or(false);
                if removed {
                    let bytes = serde_json::to_vec(&doc).map_err(|e| drop_failed(e.to_string()))?;
                    rewritten.push((key.to_vec(), bytes));
                }
            }
        }

        for (key, bytes) in &rewritten {
            self.docs
                .put(&mut wtxn, key, bytes)
                .map_err(|e| drop_failed(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| drop_failed(e.to_string()))?;
        Ok(rewritten.len())
    }
}

#[async_trait]
impl Rdb for LmdbRdb {
    async fn find_all<T>(
        &self,
        ctx: &UpgradeContext,
        table: &str,
        filter: Option<&Filter>,
    ) -> CmdbResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        ctx.ensure_active()?;
        let docs = self.read_table(table)?;
        let records = docs
            .into_iter()
            .filter(|d| filter.map_or(true, |f| f.matches(d)))
            .map(|d| decode_document(table, d))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(records)
    }

    async fn insert<T>(&self, ctx: &UpgradeContext, table: &str, doc: &T) -> CmdbResult<()>
    where
        T: Serialize + Sync,
    {
        ctx.ensure_active()?;
        let value = encode_document(table, doc)?;
        self.write_document(table, &value)?;
        Ok(())
    }

    async fn next_sequence(&self, ctx: &UpgradeContext, sequence: &str) -> CmdbResult<UniqueId> {
        ctx.ensure_active()?;
        Ok(self.allocate(sequence)?)
    }

    async fn drop_column(
        &self,
        ctx: &UpgradeContext,
        table: &str,
        column: &str,
    ) -> CmdbResult<()> {
        ctx.ensure_active()?;
        let rewritten = self.remove_column(table, column)?;
        tracing::debug!(table, column, rewritten, "Dropped column");
        Ok(())
    }
}
