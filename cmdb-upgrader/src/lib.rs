//! CMDB Upgrader - Versioned Storage Migrations
//!
//! Upgrade steps run through [`Upgrader`], which executes each registered
//! version at most once per store. The shipped step,
//! [`reconcile::ReconcileUnique`], turns the legacy per-attribute unique flag
//! into composite unique constraint records and then drops the flag column.

pub mod reconcile;
pub mod telemetry;
pub mod upgrader;

pub use reconcile::{
    reconcile_unique, ReconcileReport, ReconcileUnique, RECONCILE_UNIQUE_VERSION,
};
pub use telemetry::{init_logging, LogConfig, LogFormat};
pub use upgrader::{UpgradeRecord, UpgradeReport, UpgradeStep, Upgrader};
