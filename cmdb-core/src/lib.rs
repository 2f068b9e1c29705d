//! CMDB Core - Record Types, Errors and Configuration
//!
//! Pure data structures shared by the storage layer and the upgrade steps.
//! No storage access and no upgrade policy lives here.

pub mod config;
pub mod constants;
pub mod context;
pub mod entities;
pub mod error;
pub mod identity;

pub use config::{StoreConfig, UnresolvedFieldPolicy, UpgradeConfig};
pub use context::{CancelHandle, UpgradeContext};
pub use entities::{LegacyAttribute, UniqueConstraint, UniqueKey, UniqueKeyKind};
pub use error::{CmdbError, CmdbResult, ConfigError, StorageError, UpgradeError};
pub use identity::{
    new_run_id, now, AttributeId, ObjectId, OwnerId, RunId, Timestamp, UniqueId,
};
