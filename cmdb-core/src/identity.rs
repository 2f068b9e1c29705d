//! Identity types for CMDB records

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier of a legacy attribute definition row.
pub type AttributeId = i64;

/// Identifier of a uniqueness constraint, allocated from a storage sequence.
pub type UniqueId = u64;

/// Owning tenant (supplier account) identifier.
pub type OwnerId = String;

/// Entity type (object) identifier, e.g. `host` or a user-defined model id.
pub type ObjectId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a single upgrade run, used to correlate history rows and logs.
pub type RunId = Uuid;

/// Generate a new UUIDv7 run identifier (timestamp-sortable).
pub fn new_run_id() -> RunId {
    Uuid::now_v7()
}

/// Current UTC time.
pub fn now() -> Timestamp {
    Utc::now()
}
