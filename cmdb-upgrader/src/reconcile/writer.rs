//! Persist generated constraints and retire the legacy flag column.

use cmdb_core::constants::{FIELD_IS_ONLY, TABLE_OBJECT_ATTRIBUTES, TABLE_OBJECT_UNIQUE};
use cmdb_core::{CmdbResult, UniqueConstraint, UniqueId, UpgradeContext};
use cmdb_storage::Rdb;

/// Allocate an id for each constraint and insert it, in order.
///
/// Stops at the first allocation or insert failure. Constraints inserted
/// before the failure stay in place.
pub async fn write_constraints<R: Rdb>(
    ctx: &UpgradeContext,
    db: &R,
    uniques: Vec<UniqueConstraint>,
) -> CmdbResult<Vec<UniqueId>> {
    let mut ids = Vec::with_capacity(uniques.len());
    for mut unique in uniques {
        let id = db.next_sequence(ctx, TABLE_OBJECT_UNIQUE).await?;
        unique.id = id;
        db.insert(ctx, TABLE_OBJECT_UNIQUE, &unique).await?;
        tracing::debug!(
            unique_id = id,
            object_id = %unique.object_id,
            keys = ?unique.key_ids(),
            must_check = unique.must_check,
            is_pre = unique.is_pre,
            "Inserted unique constraint"
        );
        ids.push(id);
    }
    Ok(ids)
}

/// Drop the legacy unique flag from the attribute table.
pub async fn drop_legacy_flag<R: Rdb>(ctx: &UpgradeContext, db: &R) -> CmdbResult<()> {
    db.drop_column(ctx, TABLE_OBJECT_ATTRIBUTES, FIELD_IS_ONLY)
        .await?;
    tracing::info!(
        table = TABLE_OBJECT_ATTRIBUTES,
        column = FIELD_IS_ONLY,
        "Dropped legacy unique flag column"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdb_core::{CmdbError, StorageError, UniqueKey};
    use cmdb_storage::{FaultPlan, MemoryRdb, StorageOp};
    use chrono::Utc;

    fn uniques(n: usize) -> Vec<UniqueConstraint> {
        (0..n)
            .map(|i| {
                UniqueConstraint::new(
                    format!("obj{i}"),
                    vec![UniqueKey::property(i as u64 + 100)],
                    true,
                    false,
                    "0",
                    Utc::now(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_each_constraint_gets_fresh_id_then_insert() {
        let db = MemoryRdb::new();
        let ctx = UpgradeContext::background();

        let ids = write_constraints(&ctx, &db, uniques(3)).await.unwrap();

        assert_eq!(ids, vec![1, 2, 3]);
        let stored: Vec<UniqueConstraint> = db
            .documents(TABLE_OBJECT_UNIQUE)
            .into_iter()
            .map(|d| serde_json::from_value(d).unwrap())
            .collect();
        assert_eq!(stored.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(stored[2].object_id, "obj2");

        let journal = db.journal();
        assert_eq!(journal.len(), 6);
        for pair in journal.chunks(2) {
            assert!(matches!(pair[0], StorageOp::NextSequence { .. }));
            assert!(matches!(pair[1], StorageOp::Insert { .. }));
        }
    }

    #[tokio::test]
    async fn test_ids_continue_existing_sequence() {
        let db = MemoryRdb::new();
        let ctx = UpgradeContext::background();
        db.next_sequence(&ctx, TABLE_OBJECT_UNIQUE).await.unwrap();
        db.next_sequence(&ctx, TABLE_OBJECT_UNIQUE).await.unwrap();

        let ids = write_constraints(&ctx, &db, uniques(2)).await.unwrap();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_sequence_failure_stops_before_insert() {
        let db = MemoryRdb::with_faults(FaultPlan {
            fail_sequence_on: Some(2),
            ..Default::default()
        });
        let ctx = UpgradeContext::background();

        let err = write_constraints(&ctx, &db, uniques(4)).await.unwrap_err();

        assert!(matches!(
            err,
            CmdbError::Storage(StorageError::SequenceFailed { .. })
        ));
        assert_eq!(db.count(TABLE_OBJECT_UNIQUE), 1);
    }

    #[tokio::test]
    async fn test_drop_legacy_flag_targets_attribute_table() {
        let db = MemoryRdb::new();
        let ctx = UpgradeContext::background();

        drop_legacy_flag(&ctx, &db).await.unwrap();

        assert_eq!(
            db.journal(),
            vec![StorageOp::DropColumn {
                table: TABLE_OBJECT_ATTRIBUTES.to_string(),
                column: FIELD_IS_ONLY.to_string(),
            }]
        );
    }
}
