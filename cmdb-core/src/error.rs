//! Error types for CMDB upgrade operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Find failed on {table}: {reason}")]
    FindFailed { table: String, reason: String },

    #[error("Insert failed on {table}: {reason}")]
    InsertFailed { table: String, reason: String },

    #[error("Sequence allocation failed for {sequence}: {reason}")]
    SequenceFailed { sequence: String, reason: String },

    #[error("Drop column {column} failed on {table}: {reason}")]
    DropColumnFailed {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Serialization failed for {table}: {reason}")]
    Serialization { table: String, reason: String },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Operation cancelled")]
    Cancelled,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Upgrade orchestration and reconciliation errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpgradeError {
    #[error("Built-in constraint on {object_id} references missing property {property_id}")]
    UnresolvedField {
        object_id: String,
        property_id: String,
    },

    #[error("Duplicate upgrade step version: {version}")]
    DuplicateStep { version: String },

    #[error("Upgrade step {version} failed: {source}")]
    StepFailed {
        version: String,
        source: Box<CmdbError>,
    },

    /// The step committed but its history row was not written; the step will
    /// run again unless the row is added by hand.
    #[error("Upgrade step {version} applied but not recorded: {source}")]
    RecordFailed {
        version: String,
        source: Box<CmdbError>,
    },
}

/// Master error type for all CMDB errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CmdbError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upgrade error: {0}")]
    Upgrade(#[from] UpgradeError),
}

/// Result type alias for CMDB operations.
pub type CmdbResult<T> = Result<T, CmdbError>;

// =============================================================================
// TESTS
// =============================================================================
