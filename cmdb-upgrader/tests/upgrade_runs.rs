//! Upgrader runs against both storage backends.

use cmdb_core::constants::{
    FIELD_IS_ONLY, TABLE_OBJECT_ATTRIBUTES, TABLE_OBJECT_UNIQUE, TABLE_UPGRADE_HISTORY,
};
use cmdb_core::{
    CmdbError, StorageError, UniqueConstraint, UpgradeConfig, UpgradeContext, UpgradeError,
};
use cmdb_storage::{LmdbRdb, Rdb};
use cmdb_test_utils::assertions::{assert_legacy_flag_present, assert_step_failed, stored_constraints};
use cmdb_test_utils::fixtures::{
    builtin_attributes, fail_unique_insert, seeded_rdb, server_attributes, zone_attributes,
};
use cmdb_test_utils::FaultPlan;
use cmdb_upgrader::{UpgradeRecord, Upgrader, RECONCILE_UNIQUE_VERSION};
use serde_json::Value;

fn store_contents() -> Vec<cmdb_core::LegacyAttribute> {
    let mut attrs = builtin_attributes("0");
    attrs.extend(server_attributes());
    attrs.extend(zone_attributes());
    attrs
}

#[tokio::test]
async fn reconcile_runs_once_per_store() {
    let db = seeded_rdb(&store_contents(), FaultPlan::default());
    let upgrader = Upgrader::with_default_steps();
    let ctx = UpgradeContext::background();
    let config = UpgradeConfig::default();

    let first = upgrader.run(&ctx, &db, &config).await.unwrap();
    let second = upgrader.run(&ctx, &db, &config).await.unwrap();

    assert_eq!(first.applied, vec![RECONCILE_UNIQUE_VERSION.to_string()]);
    assert_eq!(second.skipped, vec![RECONCILE_UNIQUE_VERSION.to_string()]);
    assert!(second.applied.is_empty());
    assert_eq!(stored_constraints(&db).len(), 9);
    assert_legacy_flag_present(&db, false);
    assert_eq!(db.count(TABLE_UPGRADE_HISTORY), 1);
}

#[tokio::test]
async fn failed_reconcile_is_not_recorded() {
    let db = seeded_rdb(&store_contents(), fail_unique_insert(3));
    let upgrader = Upgrader::with_default_steps();
    let ctx = UpgradeContext::background();

    let result = upgrader.run(&ctx, &db, &UpgradeConfig::default()).await;

    assert_step_failed(&result, RECONCILE_UNIQUE_VERSION);
    assert_eq!(db.count(TABLE_OBJECT_UNIQUE), 2);
    assert_eq!(db.count(TABLE_UPGRADE_HISTORY), 0);
    assert_legacy_flag_present(&db, true);
    assert!(!upgrader
        .is_applied(&ctx, &db, RECONCILE_UNIQUE_VERSION)
        .await
        .unwrap());
}

#[tokio::test]
async fn unrecorded_step_is_reported_apart_from_a_failed_step() {
    let db = seeded_rdb(
        &store_contents(),
        FaultPlan {
            fail_insert_on: Some((TABLE_UPGRADE_HISTORY.to_string(), 1)),
            ..Default::default()
        },
    );
    let upgrader = Upgrader::with_default_steps();
    let ctx = UpgradeContext::background();

    let err = upgrader
        .run(&ctx, &db, &UpgradeConfig::default())
        .await
        .unwrap_err();

    match err {
        CmdbError::Upgrade(UpgradeError::RecordFailed { version, source }) => {
            assert_eq!(version, RECONCILE_UNIQUE_VERSION);
            assert!(matches!(
                *source,
                CmdbError::Storage(StorageError::InsertFailed { ref table, .. })
                    if table == TABLE_UPGRADE_HISTORY
            ));
        }
        other => panic!("expected RecordFailed, got: {other:?}"),
    }

    // The step itself committed.
    assert_eq!(stored_constraints(&db).len(), 9);
    assert_legacy_flag_present(&db, false);
    assert_eq!(db.count(TABLE_UPGRADE_HISTORY), 0);
}

#[tokio::test]
async fn lmdb_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = UpgradeContext::background();
    let config = UpgradeConfig::default();

    {
        let db = LmdbRdb::open(dir.path(), 16).unwrap();
        for attr in store_contents() {
            db.insert(&ctx, TABLE_OBJECT_ATTRIBUTES, &attr).await.unwrap();
        }

        let report = Upgrader::with_default_steps()
            .run(&ctx, &db, &config)
            .await
            .unwrap();
        assert_eq!(report.applied, vec![RECONCILE_UNIQUE_VERSION.to_string()]);

        let uniques: Vec<UniqueConstraint> =
            db.find_all(&ctx, TABLE_OBJECT_UNIQUE, None).await.unwrap();
        assert_eq!(uniques.len(), 9);
        assert_eq!(
            uniques.iter().map(|u| u.id).collect::<Vec<_>>(),
            (1..=9).collect::<Vec<_>>()
        );
        assert_eq!(uniques[8].object_id, "server");
        assert_eq!(uniques[8].key_ids(), vec![900, 901]);

        let rows: Vec<Value> = db
            .find_all(&ctx, TABLE_OBJECT_ATTRIBUTES, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), store_contents().len());
        assert!(rows.iter().all(|r| r.get(FIELD_IS_ONLY).is_none()));
    }

    let db = LmdbRdb::open(dir.path(), 16).unwrap();
    let report = Upgrader::with_default_steps()
        .run(&ctx, &db, &config)
        .await
        .unwrap();
    assert_eq!(report.skipped, vec![RECONCILE_UNIQUE_VERSION.to_string()]);

    let history: Vec<UpgradeRecord> = db
        .find_all(&ctx, TABLE_UPGRADE_HISTORY, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, RECONCILE_UNIQUE_VERSION);
    assert_eq!(history[0].run_id, ctx.run_id());
}
