//! Uniqueness constraints seeded for the built-in entity types.

use cmdb_core::constants::{
    FIELD_ASSET_ID, FIELD_BUSINESS_ID, FIELD_BUSINESS_NAME, FIELD_CLOUD_ID, FIELD_CLOUD_NAME,
    FIELD_FUNC_ID, FIELD_HOST_INNER_IP, FIELD_MODULE_NAME, FIELD_PROCESS_NAME, FIELD_SET_NAME,
    OBJECT_BUSINESS, OBJECT_HOST, OBJECT_MODULE, OBJECT_PLAT, OBJECT_PROCESS, OBJECT_SET,
};
use cmdb_core::{
    CmdbResult, Timestamp, UniqueConstraint, UniqueKey, UnresolvedFieldPolicy, UpgradeError,
};

use super::index::{member_id, AttributeIndex};

/// One catalog row: the named properties of `object_id` that together must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinUnique {
    pub object_id: &'static str,
    pub properties: &'static [&'static str],
    pub must_check: bool,
    pub is_pre: bool,
}

/// Catalog of built-in constraints, emitted in this order.
pub const BUILTIN_UNIQUES: [BuiltinUnique; 8] = [
    BuiltinUnique {
        object_id: OBJECT_HOST,
        properties: &[FIELD_ASSET_ID],
        must_check: true,
        is_pre: true,
    },
    BuiltinUnique {
        object_id: OBJECT_HOST,
        properties: &[FIELD_CLOUD_ID, FIELD_HOST_INNER_IP],
        must_check: false,
        is_pre: true,
    },
    BuiltinUnique {
        object_id: OBJECT_PROCESS,
        properties: &[FIELD_BUSINESS_ID, FIELD_PROCESS_NAME],
        must_check: true,
        is_pre: true,
    },
    BuiltinUnique {
        object_id: OBJECT_PROCESS,
        properties: &[FIELD_BUSINESS_ID, FIELD_FUNC_ID],
        must_check: false,
        is_pre: true,
    },
    BuiltinUnique {
        object_id: OBJECT_BUSINESS,
        properties: &[FIELD_BUSINESS_NAME],
        must_check: true,
        is_pre: true,
    },
    BuiltinUnique {
        object_id: OBJECT_SET,
        properties: &[FIELD_BUSINESS_ID, FIELD_SET_NAME],
        must_check: true,
        is_pre: true,
    },
    BuiltinUnique {
        object_id: OBJECT_MODULE,
        properties: &[FIELD_BUSINESS_ID, FIELD_MODULE_NAME],
        must_check: true,
        is_pre: true,
    },
    BuiltinUnique {
        object_id: OBJECT_PLAT,
        properties: &[FIELD_CLOUD_NAME],
        must_check: true,
        is_pre: true,
    },
];

impl BuiltinUnique {
    /// Resolve the catalog row against the index.
    ///
    /// Under [`UnresolvedFieldPolicy::Preserve`] a missing property becomes a
    /// member with id 0; under [`UnresolvedFieldPolicy::FailFast`] it is an
    /// [`UpgradeError::UnresolvedField`].
    pub fn resolve(
        &self,
        index: &AttributeIndex,
        owner_id: &str,
        policy: UnresolvedFieldPolicy,
        now: Timestamp,
    ) -> CmdbResult<UniqueConstraint> {
        let mut keys = Vec::with_capacity(self.properties.len());
        for property_id in self.properties {
            let id = match index.resolve(self.object_id, property_id) {
                Some(attr) => member_id(attr),
                None => match policy {
                    UnresolvedFieldPolicy::Preserve => {
                        tracing::warn!(
                            object_id = self.object_id,
                            property_id,
                            "Built-in constraint member not found, keeping zero id"
                        );
                        0
                    }
                    UnresolvedFieldPolicy::FailFast => {
                        return Err(UpgradeError::UnresolvedField {
                            object_id: self.object_id.to_string(),
                            property_id: property_id.to_string(),
                        }
                        .into());
                    }
                },
            };
            keys.push(UniqueKey::property(id));
        }

        Ok(UniqueConstraint::new(
            self.object_id,
            keys,
            self.must_check,
            self.is_pre,
            owner_id,
            now,
        ))
    }
}

/// Every catalog constraint, resolved, in catalog order.
pub fn builtin_constraints(
    index: &AttributeIndex,
    owner_id: &str,
    policy: UnresolvedFieldPolicy,
    now: Timestamp,
) -> CmdbResult<Vec<UniqueConstraint>> {
    BUILTIN_UNIQUES
        .iter()
        .map(|builtin| builtin.resolve(index, owner_id, policy, now))
        .collect()
}
