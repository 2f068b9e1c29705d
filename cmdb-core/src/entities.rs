//! Persisted record types touched by the upgrade steps.

use crate::constants::FIELD_INST_NAME;
use crate::identity::{AttributeId, ObjectId, OwnerId, Timestamp, UniqueId};
use serde::{Deserialize, Serialize};

// ============================================================================
// LEGACY ATTRIBUTE
// ============================================================================

/// A per-entity-type field definition as stored before the unique flag was
/// replaced by constraint records.
///
/// Rows are loosely typed in storage, so every field defaults when absent.
/// Fields that the reconcile step does not look at are still carried so the
/// record round-trips without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyAttribute {
    pub id: AttributeId,
    #[serde(rename = "bk_supplier_account")]
    pub owner_id: OwnerId,
    #[serde(rename = "bk_obj_id")]
    pub object_id: ObjectId,
    #[serde(rename = "bk_property_id")]
    pub property_id: String,
    #[serde(rename = "bk_property_name")]
    pub property_name: String,
    #[serde(rename = "bk_property_group")]
    pub property_group: String,
    #[serde(rename = "bk_property_index")]
    pub property_index: i64,
    pub unit: String,
    pub placeholder: String,
    #[serde(rename = "editable")]
    pub is_editable: bool,
    #[serde(rename = "ispre")]
    pub is_pre: bool,
    #[serde(rename = "isrequired")]
    pub is_required: bool,
    #[serde(rename = "isreadonly")]
    pub is_readonly: bool,
    /// The legacy unique flag.
    #[serde(rename = "isonly")]
    pub is_only: bool,
    #[serde(rename = "bk_issystem")]
    pub is_system: bool,
    #[serde(rename = "bk_isapi")]
    pub is_api: bool,
    #[serde(rename = "bk_property_type")]
    pub property_type: String,
    pub option: serde_json::Value,
    pub description: String,
    pub creator: String,
    pub create_time: Option<Timestamp>,
    /// Older rows were written under the misspelled `creaet_time` key, and
    /// some carry both keys.
    #[serde(rename = "creaet_time", skip_serializing_if = "Option::is_none")]
    pub legacy_create_time: Option<Timestamp>,
    pub last_time: Option<Timestamp>,
}

impl LegacyAttribute {
    /// The attribute id as a constraint key id.
    ///
    /// Negative ids never reference a real row and map to 0, the same value an
    /// unresolved lookup produces.
    pub fn key_id(&self) -> UniqueId {
        UniqueId::try_from(self.id).unwrap_or(0)
    }

    /// Creation time under either key, the correctly spelled one first.
    pub fn created_at(&self) -> Option<Timestamp> {
        self.create_time.or(self.legacy_create_time)
    }

    /// Whether this is the system-seeded instance name property.
    pub fn is_preset_instance_name(&self) -> bool {
        self.is_pre && self.property_id == FIELD_INST_NAME
    }
}

// ============================================================================
// UNIQUE CONSTRAINT
// ============================================================================

/// How a constraint member refers to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniqueKeyKind {
    /// Reference by attribute id.
    Property,
}

/// One member of a composite uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueKey {
    #[serde(rename = "key_kind")]
    pub kind: UniqueKeyKind,
    #[serde(rename = "key_id")]
    pub id: UniqueId,
}

impl UniqueKey {
    /// A member referencing an attribute by id.
    pub fn property(id: UniqueId) -> Self {
        Self {
            kind: UniqueKeyKind::Property,
            id,
        }
    }
}

/// "Within entity type X, the tuple of these fields must be unique."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Assigned from the constraint table sequence at write time; 0 until then.
    pub id: UniqueId,
    #[serde(rename = "bk_obj_id")]
    pub object_id: ObjectId,
    /// Enforced on write when true, tracked only when false.
    pub must_check: bool,
    pub keys: Vec<UniqueKey>,
    /// System-seeded rather than derived from legacy data.
    #[serde(rename = "ispre")]
    pub is_pre: bool,
    #[serde(rename = "bk_supplier_account")]
    pub owner_id: OwnerId,
    pub last_time: Timestamp,
}

impl UniqueConstraint {
    /// Build an unsaved constraint.
    pub fn new(
        object_id: impl Into<ObjectId>,
        keys: Vec<UniqueKey>,
        must_check: bool,
        is_pre: bool,
        owner_id: impl Into<OwnerId>,
        last_time: Timestamp,
    ) -> Self {
        Self {
            id: 0,
            object_id: object_id.into(),
            must_check,
            keys,
            is_pre,
            owner_id: owner_id.into(),
            last_time,
        }
    }

    /// Member attribute ids in order.
    pub fn key_ids(&self) -> Vec<UniqueId> {
        self.keys.iter().map(|k| k.id).collect()
    }
}
