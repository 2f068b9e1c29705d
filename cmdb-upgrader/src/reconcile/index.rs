//! In-memory lookups over the loaded legacy attributes.
//!
//! The legacy rows and the new constraint records are only linked through the
//! `(entity type, property id)` string pair, so this index is the single place
//! that join is resolved.

use cmdb_core::{LegacyAttribute, ObjectId, UniqueId};
use std::collections::HashMap;

/// Join key between legacy attributes and constraint members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    pub object_id: ObjectId,
    pub property_id: String,
}

impl PropertyKey {
    pub fn new(object_id: impl Into<ObjectId>, property_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            property_id: property_id.into(),
        }
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.object_id, self.property_id)
    }
}

/// Constraint member id for `attr`.
///
/// A negative attribute id cannot be a key id and becomes 0, the same value an
/// unresolved member gets; the row is logged so the two can be told apart.
pub fn member_id(attr: &LegacyAttribute) -> UniqueId {
    if attr.id < 0 {
        tracing::warn!(
            object_id = %attr.object_id,
            property_id = %attr.property_id,
            attribute_id = attr.id,
            "Negative attribute id, keeping zero member id"
        );
    }
    attr.key_id()
}

/// Lookups built from one full attribute load.
///
/// `by_property` has last-write-wins semantics: when two rows share a
/// [`PropertyKey`] (possible across tenants) the later row replaces the
/// earlier one and the key is recorded in [`AttributeIndex::collisions`].
#[derive(Debug, Default)]
pub struct AttributeIndex {
    unique_by_object: Vec<(ObjectId, Vec<LegacyAttribute>)>,
    object_slots: HashMap<ObjectId, usize>,
    by_property: HashMap<PropertyKey, LegacyAttribute>,
    collisions: Vec<PropertyKey>,
}

impl AttributeIndex {
    /// Index attributes in load order.
    pub fn build(attributes: &[LegacyAttribute]) -> Self {
        let mut index = Self::default();
        for attr in attributes {
            if attr.is_only {
                index.push_unique(attr);
            }
            let key = PropertyKey::new(attr.object_id.as_str(), attr.property_id.as_str());
            if index.by_property.insert(key.clone(), attr.clone()).is_some() {
                index.collisions.push(key);
            }
        }
        index
    }

    fn push_unique(&mut self, attr: &LegacyAttribute) {
        let slot = match self.object_slots.get(&attr.object_id) {
            Some(slot) => *slot,
            None => {
                let slot = self.unique_by_object.len();
                self.unique_by_object
                    .push((attr.object_id.clone(), Vec::new()));
                self.object_slots.insert(attr.object_id.clone(), slot);
                slot
            }
        };
        self.unique_by_object[slot].1.push(attr.clone());
    }

    /// Entity types with at least one unique-flagged attribute, in first-seen
    /// order, each with its flagged attributes in load order.
    pub fn unique_by_object(&self) -> impl Iterator<Item = (&str, &[LegacyAttribute])> {
        self.unique_by_object
            .iter()
            .map(|(object_id, attrs)| (object_id.as_str(), attrs.as_slice()))
    }

    /// Unique-flagged attributes of one entity type.
    pub fn unique_attributes(&self, object_id: &str) -> &[LegacyAttribute] {
        self.object_slots
            .get(object_id)
            .map(|slot| self.unique_by_object[*slot].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn resolve(&self, object_id: &str, property_id: &str) -> Option<&LegacyAttribute> {
        self.by_property.get(&PropertyKey::new(object_id, property_id))
    }

    /// Member id for the key, 0 when the key is absent.
    pub fn resolve_id(&self, object_id: &str, property_id: &str) -> UniqueId {
        self.resolve(object_id, property_id)
            .map(member_id)
            .unwrap_or(0)
    }

    /// Keys whose earlier row was overwritten, once per overwrite.
    pub fn collisions(&self) -> &[PropertyKey] {
        &self.collisions
    }

    /// Number of distinct `(entity type, property id)` keys.
    pub fn len(&self) -> usize {
        self.by_property.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_property.is_empty()
    }
}
