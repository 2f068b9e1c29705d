//! Table, object and field names shared by the upgrade steps.
//!
//! These are storage-level identifiers: they must match what is already
//! persisted, so they are plain string constants rather than enums.

// ============================================================================
// TABLES
// ============================================================================

/// Attribute definitions (one row per entity type property).
pub const TABLE_OBJECT_ATTRIBUTES: &str = "cc_ObjAttDes";

/// Uniqueness constraints. Also names the id sequence for the table.
pub const TABLE_OBJECT_UNIQUE: &str = "cc_ObjectUnique";

/// Applied upgrade step history.
pub const TABLE_UPGRADE_HISTORY: &str = "cc_UpgradeHistory";

// ============================================================================
// BUILT-IN ENTITY TYPES
// ============================================================================

pub const OBJECT_HOST: &str = "host";
pub const OBJECT_PROCESS: &str = "process";
pub const OBJECT_BUSINESS: &str = "biz";
pub const OBJECT_SET: &str = "set";
pub const OBJECT_MODULE: &str = "module";
/// Cloud area.
pub const OBJECT_PLAT: &str = "plat";

// ============================================================================
// FIELDS
// ============================================================================

/// Legacy per-attribute unique flag, dropped by the reconcile step.
pub const FIELD_IS_ONLY: &str = "isonly";

/// Universal auto-generated instance name property.
pub const FIELD_INST_NAME: &str = "bk_inst_name";

pub const FIELD_ASSET_ID: &str = "bk_asset_id";
pub const FIELD_CLOUD_ID: &str = "bk_cloud_id";
pub const FIELD_HOST_INNER_IP: &str = "bk_host_innerip";
pub const FIELD_BUSINESS_ID: &str = "bk_biz_id";
pub const FIELD_BUSINESS_NAME: &str = "bk_biz_name";
pub const FIELD_PROCESS_NAME: &str = "bk_process_name";
pub const FIELD_FUNC_ID: &str = "bk_func_id";
pub const FIELD_SET_NAME: &str = "bk_set_name";
pub const FIELD_MODULE_NAME: &str = "bk_module_name";
pub const FIELD_CLOUD_NAME: &str = "bk_cloud_name";

/// Default supplier account used when no owner is configured.
pub const DEFAULT_OWNER_ID: &str = "0";
