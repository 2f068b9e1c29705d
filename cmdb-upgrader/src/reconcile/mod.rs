//! Replace the legacy per-attribute unique flag with constraint records.
//!
//! Runs once, as upgrade step [`RECONCILE_UNIQUE_VERSION`]:
//!
//! 1. load every attribute definition, across all owners
//! 2. index them by entity type and by `(entity type, property id)`
//! 3. resolve the built-in catalog, then derive one constraint per
//!    user-defined type that still carries unique-flagged attributes
//! 4. allocate ids and insert the constraints, builtin first
//! 5. drop the `isonly` column
//!
//! The step is not atomic. A failure part way through leaves the constraints
//! written so far in place and the legacy column intact; running it again on
//! the same data would insert duplicates, which is why the upgrader records
//! the version once it succeeds.

pub mod catalog;
pub mod derived;
pub mod index;
pub mod writer;

pub use catalog::{builtin_constraints, BuiltinUnique, BUILTIN_UNIQUES};
pub use derived::{derive_constraint, derived_constraints, is_instance_name_only};
pub use index::{member_id, AttributeIndex, PropertyKey};
pub use writer::{drop_legacy_flag, write_constraints};

use async_trait::async_trait;
use cmdb_core::constants::TABLE_OBJECT_ATTRIBUTES;
use cmdb_core::{
    now, CmdbResult, LegacyAttribute, UniqueId, UpgradeConfig, UpgradeContext,
};
use cmdb_storage::Rdb;

use crate::upgrader::UpgradeStep;

/// Version label under which the reconcile step is recorded.
pub const RECONCILE_UNIQUE_VERSION: &str = "x18.11.19.01";

/// Outcome of a successful reconcile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub attributes_loaded: usize,
    pub builtin_written: usize,
    pub derived_written: usize,
    /// Ids of the inserted constraints, builtin first.
    pub unique_ids: Vec<UniqueId>,
    pub key_collisions: usize,
}

/// Read every legacy attribute definition, unfiltered.
pub async fn load_attributes<R: Rdb>(
    ctx: &UpgradeContext,
    db: &R,
) -> CmdbResult<Vec<LegacyAttribute>> {
    db.find_all(ctx, TABLE_OBJECT_ATTRIBUTES, None).await
}

/// Run the whole reconciliation against `db`.
///
/// Returns the first storage error as-is.
pub async fn reconcile_unique<R: Rdb>(
    ctx: &UpgradeContext,
    db: &R,
    config: &UpgradeConfig,
) -> CmdbResult<ReconcileReport> {
    let attributes = load_attributes(ctx, db).await?;
    let index = AttributeIndex::build(&attributes);
    for key in index.collisions() {
        tracing::warn!(key = %key, "Duplicate attribute key, later row wins");
    }

    let created_at = now();
    let builtin = builtin_constraints(
        &index,
        &config.owner_id,
        config.unresolved_field_policy,
        created_at,
    )?;
    let derived = derived_constraints(&index, &config.owner_id, created_at);

    let builtin_count = builtin.len();
    let derived_count = derived.len();
    tracing::info!(
        run_id = %ctx.run_id(),
        attributes = attributes.len(),
        builtin = builtin_count,
        derived = derived_count,
        "Generated unique constraints"
    );

    let mut uniques = builtin;
    uniques.extend(derived);
    let unique_ids = write_constraints(ctx, db, uniques).await?;

    drop_legacy_flag(ctx, db).await?;

    Ok(ReconcileReport {
        attributes_loaded: attributes.len(),
        builtin_written: builtin_count,
        derived_written: derived_count,
        unique_ids,
        key_collisions: index.collisions().len(),
    })
}

/// [`reconcile_unique`] as an upgrade step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileUnique;

#[async_trait]
impl<R: Rdb> UpgradeStep<R> for ReconcileUnique {
    fn version(&self) -> &str {
        RECONCILE_UNIQUE_VERSION
    }

    async fn run(&self, ctx: &UpgradeContext, db: &R, config: &UpgradeConfig) -> CmdbResult<()> {
        let report = reconcile_unique(ctx, db, config).await?;
        tracing::info!(
            builtin = report.builtin_written,
            derived = report.derived_written,
            collisions = report.key_collisions,
            "Reconciled legacy unique flags"
        );
        Ok(())
    }
}
