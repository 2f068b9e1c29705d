//! CMDB Test Utilities
//!
//! Shared test infrastructure for the CMDB workspace:
//! - Fixtures for legacy attribute rows and seeded stores
//! - Proptest generators for attribute sets
//! - Assertions for upgrade outcomes

// Re-export mock storage from its source crate
pub use cmdb_storage::{FaultPlan, MemoryRdb, StorageOp};

// Re-export core types for convenience
pub use cmdb_core::{
    constants, AttributeId, CmdbError, CmdbResult, LegacyAttribute, ObjectId, StorageError,
    Timestamp, UniqueConstraint, UniqueKey, UpgradeConfig, UpgradeContext, UpgradeError,
};

use chrono::Utc;
use cmdb_core::constants::{
    FIELD_ASSET_ID, FIELD_BUSINESS_ID, FIELD_BUSINESS_NAME, FIELD_CLOUD_ID, FIELD_CLOUD_NAME,
    FIELD_FUNC_ID, FIELD_HOST_INNER_IP, FIELD_INST_NAME, FIELD_MODULE_NAME, FIELD_PROCESS_NAME,
    FIELD_SET_NAME, OBJECT_BUSINESS, OBJECT_HOST, OBJECT_MODULE, OBJECT_PLAT, OBJECT_PROCESS,
    OBJECT_SET, TABLE_OBJECT_ATTRIBUTES, TABLE_OBJECT_UNIQUE,
};

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built attribute rows and stores for common upgrade scenarios.

    use super::*;

    /// Builder for a single [`LegacyAttribute`] row.
    ///
    /// Starts as a plain, non-unique, non-preset string field owned by "0".
    #[derive(Debug, Clone)]
    pub struct AttributeBuilder {
        attr: LegacyAttribute,
    }

    impl AttributeBuilder {
        /// Set the legacy unique flag.
        pub fn unique(mut self) -> Self {
            self.attr.is_only = true;
            self
        }

        /// Mark as system-seeded.
        pub fn preset(mut self) -> Self {
            self.attr.is_pre = true;
            self
        }

        pub fn owner(mut self, owner_id: &str) -> Self {
            self.attr.owner_id = owner_id.to_string();
            self
        }

        pub fn property_type(mut self, property_type: &str) -> Self {
            self.attr.property_type = property_type.to_string();
            self
        }

        pub fn build(&self) -> LegacyAttribute {
            self.attr.clone()
        }
    }

    /// Start a row for `property_id` on entity type `object_id`.
    pub fn attribute(id: AttributeId, object_id: &str, property_id: &str) -> AttributeBuilder {
        let now = Utc::now();
        AttributeBuilder {
            attr: LegacyAttribute {
                id,
                owner_id: "0".to_string(),
                object_id: object_id.to_string(),
                property_id: property_id.to_string(),
                property_name: property_id.to_string(),
                property_group: "default".to_string(),
                is_editable: true,
                property_type: "singlechar".to_string(),
                creator: "cc_system".to_string(),
                create_time: Some(now),
                last_time: Some(now),
                ..Default::default()
            },
        }
    }

    /// Every field referenced by the built-in constraint catalog, preset and
    /// without the unique flag, plus a few non-catalog host fields.
    ///
    /// Ids are 1..=15 and never collide with the custom fixtures below.
    pub fn builtin_attributes(owner_id: &str) -> Vec<LegacyAttribute> {
        let rows: [(&str, &str); 15] = [
            (OBJECT_HOST, FIELD_ASSET_ID),
            (OBJECT_HOST, FIELD_CLOUD_ID),
            (OBJECT_HOST, FIELD_HOST_INNER_IP),
            (OBJECT_HOST, "bk_host_name"),
            (OBJECT_HOST, "bk_os_type"),
            (OBJECT_PROCESS, FIELD_BUSINESS_ID),
            (OBJECT_PROCESS, FIELD_PROCESS_NAME),
            (OBJECT_PROCESS, FIELD_FUNC_ID),
            (OBJECT_BUSINESS, FIELD_BUSINESS_NAME),
            (OBJECT_SET, FIELD_BUSINESS_ID),
            (OBJECT_SET, FIELD_SET_NAME),
            (OBJECT_MODULE, FIELD_BUSINESS_ID),
            (OBJECT_MODULE, FIELD_MODULE_NAME),
            (OBJECT_PLAT, FIELD_CLOUD_NAME),
            (OBJECT_PLAT, FIELD_CLOUD_ID),
        ];
        rows.iter()
            .zip(1..)
            .map(|((object_id, property_id), id)| {
                attribute(id, object_id, property_id)
                    .preset()
                    .owner(owner_id)
                    .build()
            })
            .collect()
    }

    /// A user-defined `server` type: `serial` (900) and `rack` (901) flagged
    /// unique, `hostname` (902) not.
    pub fn server_attributes() -> Vec<LegacyAttribute> {
        vec![
            attribute(900, "server", "serial").unique().build(),
            attribute(901, "server", "rack").unique().build(),
            attribute(902, "server", "hostname").build(),
        ]
    }

    /// A user-defined `zone` type whose only unique field is the preset
    /// instance name.
    pub fn zone_attributes() -> Vec<LegacyAttribute> {
        vec![
            attribute(910, "zone", FIELD_INST_NAME).preset().unique().build(),
            attribute(911, "zone", "zone_code").build(),
        ]
    }

    /// In-memory store with `attributes` loaded into the attribute table.
    pub fn seeded_rdb(attributes: &[LegacyAttribute], faults: FaultPlan) -> MemoryRdb {
        let db = MemoryRdb::with_faults(faults);
        db.seed_records(TABLE_OBJECT_ATTRIBUTES, attributes)
            .expect("seeding attribute table");
        db
    }

    /// Fault plan failing the `n`th insert into the constraint table.
    pub fn fail_unique_insert(n: usize) -> FaultPlan {
        FaultPlan {
            fail_insert_on: Some((TABLE_OBJECT_UNIQUE.to_string(), n)),
            ..Default::default()
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for legacy attribute data.

    use super::*;
    use proptest::prelude::*;

    /// Entity type names outside the built-in set.
    pub fn arb_custom_object_id() -> impl Strategy<Value = ObjectId> {
        "[a-z]{2,6}_[a-z]{2,6}"
    }

    pub fn arb_property_id() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "[a-z]{2,8}(_[a-z]{2,6})?",
            1 => Just(FIELD_INST_NAME.to_string()),
        ]
    }

    pub fn arb_owner_id() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("0".to_string()),
            Just("tenant-a".to_string()),
            Just("tenant-b".to_string()),
        ]
    }

    /// A single row with arbitrary flags. The id is a placeholder; use
    /// [`arb_attribute_set`] for rows with distinct ids.
    pub fn arb_legacy_attribute() -> impl Strategy<Value = LegacyAttribute> {
        (
            arb_custom_object_id(),
            arb_property_id(),
            arb_owner_id(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(object_id, property_id, owner_id, is_only, is_pre)| {
                let mut builder = fixtures::attribute(1, &object_id, &property_id).owner(&owner_id);
                if is_only {
                    builder = builder.unique();
                }
                if is_pre {
                    builder = builder.preset();
                }
                builder.build()
            })
    }

    /// Up to `max` rows over a small pool of entity types, with distinct
    /// positive ids starting at 1000.
    pub fn arb_attribute_set(max: usize) -> impl Strategy<Value = Vec<LegacyAttribute>> {
        prop::collection::vec(arb_custom_object_id(), 1..4).prop_flat_map(move |objects| {
            let row = (prop::sample::select(objects), arb_legacy_attribute()).prop_map(
                |(object_id, mut attr)| {
                    attr.object_id = object_id;
                    attr
                },
            );
            prop::collection::vec(row, 0..max).prop_map(|mut attrs| {
                for (attr, id) in attrs.iter_mut().zip(1000..) {
                    attr.id = id;
                }
                attrs
            })
        })
    }

    /// Built-in rows followed by an arbitrary custom attribute set.
    pub fn arb_store_contents(max: usize) -> impl Strategy<Value = Vec<LegacyAttribute>> {
        arb_attribute_set(max).prop_map(|custom| {
            let mut attrs = fixtures::builtin_attributes("0");
            attrs.extend(custom);
            attrs
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over upgrade results and store contents.

    use super::*;
    use cmdb_core::constants::FIELD_IS_ONLY;

    /// Assert that a result is a storage error.
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &CmdbResult<T>) {
        match result {
            Err(CmdbError::Storage(_)) => {}
            other => panic!("Expected storage error, got: {:?}", other),
        }
    }

    /// Assert that a result is a failed upgrade step with the given version.
    pub fn assert_step_failed<T: std::fmt::Debug>(result: &CmdbResult<T>, expected: &str) {
        match result {
            Err(CmdbError::Upgrade(UpgradeError::StepFailed { version, .. })) => {
                assert_eq!(version, expected, "Failed step version mismatch");
            }
            other => panic!("Expected failed step {}, got: {:?}", expected, other),
        }
    }

    /// Constraint rows currently stored, in insertion order.
    pub fn stored_constraints(db: &MemoryRdb) -> Vec<UniqueConstraint> {
        db.documents(TABLE_OBJECT_UNIQUE)
            .into_iter()
            .map(|doc| serde_json::from_value(doc).expect("stored constraint decodes"))
            .collect()
    }

    /// Assert whether the legacy flag is still present on any attribute row.
    pub fn assert_legacy_flag_present(db: &MemoryRdb, expected: bool) {
        let present = db
            .documents(TABLE_OBJECT_ATTRIBUTES)
            .iter()
            .any(|doc| doc.get(FIELD_IS_ONLY).is_some());
        assert_eq!(present, expected, "Legacy unique flag presence mismatch");
    }
}
