//! CMDB Storage - Document Storage Trait and Mock Implementation
//!
//! Defines the table abstraction the upgrade steps run against: bulk read,
//! single insert, named sequences and column removal. Records are stored as
//! JSON documents and decoded into typed records at the boundary.

pub mod lmdb_backend;

pub use lmdb_backend::{LmdbRdb, LmdbRdbError};

use async_trait::async_trait;
use cmdb_core::{CmdbResult, StorageError, UniqueId, UpgradeContext};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// FILTER
// ============================================================================

/// Equality filter over top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Whether every condition holds for the document.
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// Encode a typed record into a storable document.
pub fn encode_document<T: Serialize + ?Sized>(table: &str, doc: &T) -> Result<Value, StorageError> {
    serde_json::to_value(doc).map_err(|e| StorageError::Serialization {
        table: table.to_string(),
        reason: e.to_string(),
    })
}

/// Decode a stored document into a typed record.
pub fn decode_document<T: DeserializeOwned>(table: &str, doc: Value) -> Result<T, StorageError> {
    serde_json::from_value(doc).map_err(|e| StorageError::Serialization {
        table: table.to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Table-oriented document store used by upgrade steps.
///
/// Every call takes the run's [`UpgradeContext`]; implementations refuse to
/// operate once it is cancelled.
#[async_trait]
pub trait Rdb: Send + Sync {
    /// Read every document of `table` matching `filter` (all when `None`),
    /// in insertion order.
    async fn find_all<T>(
        &self,
        ctx: &UpgradeContext,
        table: &str,
        filter: Option<&Filter>,
    ) -> CmdbResult<Vec<T>>
    where
        T: DeserializeOwned + Send;

    /// Insert a single document.
    async fn insert<T>(&self, ctx: &UpgradeContext, table: &str, doc: &T) -> CmdbResult<()>
    where
        T: Serialize + Sync;

    /// Allocate the next value of a named sequence. Values start at 1 and
    /// are never handed out twice.
    async fn next_sequence(&self, ctx: &UpgradeContext, sequence: &str) -> CmdbResult<UniqueId>;

    /// Remove `column` from every document of `table`.
    async fn drop_column(&self, ctx: &UpgradeContext, table: &str, column: &str)
        -> CmdbResult<()>;
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// A successful storage call, as recorded by [`MemoryRdb`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Find { table: String },
    Insert { table: String },
    NextSequence { sequence: String, value: UniqueId },
    DropColumn { table: String, column: String },
}

/// Failures to inject into [`MemoryRdb`]. Call numbers are 1-based.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail every read of this table.
    pub fail_find_on: Option<String>,
    /// Fail the Nth insert into the table.
    pub fail_insert_on: Option<(String, usize)>,
    /// Fail the Nth sequence allocation (any sequence).
    pub fail_sequence_on: Option<usize>,
    /// Fail every drop-column call.
    pub fail_drop_column: bool,
}

#[derive(Debug, Default)]
struct CallCounters {
    inserts: HashMap<String, usize>,
    sequences: usize,
}

/// In-memory mock storage for testing.
#[derive(Debug, Default)]
pub struct MemoryRdb {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    sequences: Arc<RwLock<HashMap<String, UniqueId>>>,
    journal: Arc<RwLock<Vec<StorageOp>>>,
    counters: Arc<RwLock<CallCounters>>,
    faults: FaultPlan,
}

impl MemoryRdb {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock storage that fails according to `faults`.
    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Append raw documents to a table without touching the journal.
    pub fn seed(&self, table: &str, docs: impl IntoIterator<Item = Value>) -> CmdbResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables.entry(table.to_string()).or_default().extend(docs);
        Ok(())
    }

    /// Append typed records to a table without touching the journal.
    pub fn seed_records<T: Serialize>(&self, table: &str, records: &[T]) -> CmdbResult<()> {
        let docs = records
            .iter()
            .map(|r| encode_document(table, r))
            .collect::<Result<Vec<_>, _>>()?;
        self.seed(table, docs)
    }

    /// Snapshot of a table's documents.
    pub fn documents(&self, table: &str) -> Vec<Value> {
        self.tables
            .read()
            .map(|t| t.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of documents in a table.
    pub fn count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Last value handed out by a sequence.
    pub fn sequence_value(&self, sequence: &str) -> Option<UniqueId> {
        self.sequences
            .read()
            .ok()
            .and_then(|s| s.get(sequence).copied())
    }

    /// Successful calls in the order they happened.
    pub fn journal(&self) -> Vec<StorageOp> {
        self.journal.read().map(|j| j.clone()).unwrap_or_default()
    }

    /// Clear all stored data, sequences and the journal.
    pub fn clear(&self) -> CmdbResult<()> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)?.clear();
        self.sequences.write().map_err(|_| StorageError::LockPoisoned)?.clear();
        self.journal.write().map_err(|_| StorageError::LockPoisoned)?.clear();
        let mut counters = self.counters.write().map_err(|_| StorageError::LockPoisoned)?;
        *counters = CallCounters::default();
        Ok(())
    }

    fn record(&self, op: StorageOp) -> Result<(), StorageError> {
        self.journal
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(op);
        Ok(())
    }
}

#[async_trait]
impl Rdb for MemoryRdb {
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
        if self.faults.fail_find_on.as_deref() == Some(table) {
            return Err(StorageError::FindFailed {
                table: table.to_string(),
                reason: "injected fault".to_string(),
            }
            .into());
        }

        let docs: Vec<Value> = {
            let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
            tables
                .get(table)
                .map(|docs| {
                    docs.iter()
                        .filter(|d| filter.map_or(true, |f| f.matches(d)))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let records = docs
            .into_iter()
            .map(|d| decode_document(table, d))
            .collect::<Result<Vec<T>, _>>()?;

        self.record(StorageOp::Find {
            table: table.to_string(),
        })?;
        Ok(records)
    }

    async fn insert<T>(&self, ctx: &UpgradeContext, table: &str, doc: &T) -> CmdbResult<()>
    where
        T: Serialize + Sync,
    {
        ctx.ensure_active()?;
        let call = {
            let mut counters = self.counters.write().map_err(|_| StorageError::LockPoisoned)?;
            let n = counters.inserts.entry(table.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if let Some((fail_table, fail_call)) = &self.faults.fail_insert_on {
            if fail_table == table && *fail_call == call {
                return Err(StorageError::InsertFailed {
                    table: table.to_string(),
                    reason: "injected fault".to_string(),
                }
                .into());
            }
        }

        let value = encode_document(table, doc)?;
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .entry(table.to_string())
            .or_default()
            .push(value);

        self.record(StorageOp::Insert {
            table: table.to_string(),
        })?;
        Ok(())
    }

    async fn next_sequence(&self, ctx: &UpgradeContext, sequence: &str) -> CmdbResult<UniqueId> {
        ctx.ensure_active()?;
        let call = {
            let mut counters = self.counters.write().map_err(|_| StorageError::LockPoisoned)?;
            counters.sequences += 1;
            counters.sequences
        };
        if self.faults.fail_sequence_on == Some(call) {
            return Err(StorageError::SequenceFailed {
                sequence: sequence.to_string(),
                reason: "injected fault".to_string(),
            }
            .into());
        }

        let value = {
            let mut sequences = self.sequences.write().map_err(|_| StorageError::LockPoisoned)?;
            let current = sequences.entry(sequence.to_string()).or_insert(0);
            *current += 1;
            *current
        };

        self.record(StorageOp::NextSequence {
            sequence: sequence.to_string(),
            value,
        })?;
        Ok(value)
    }

    async fn drop_column(
        &self,
        ctx: &UpgradeContext,
        table: &str,
        column: &str,
    ) -> CmdbResult<()> {
        ctx.ensure_active()?;
        if self.faults.fail_drop_column {
            return Err(StorageError::DropColumnFailed {
                table: table.to_string(),
                column: column.to_string(),
                reason: "injected fault".to_string(),
            }
            .into());
        }

        {
            let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
            if let Some(docs) = tables.get_mut(table) {
                for doc in docs.iter_mut() {
                    if let Some(obj) = doc.as_object_mut() {
                        obj.remove(column);
                    }
                }
            }
        }

        self.record(StorageOp::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
