//! Constraints derived from the legacy unique flag of user-defined types.

use cmdb_core::{LegacyAttribute, Timestamp, UniqueConstraint, UniqueKey};

use super::index::{member_id, AttributeIndex};

/// Whether an entity type's unique-flagged attributes are covered elsewhere.
///
/// True only when every attribute is the preset instance name property; such
/// types get no derived constraint. A non-preset attribute, or a preset
/// attribute other than the instance name, makes this false.
pub fn is_instance_name_only(attrs: &[LegacyAttribute]) -> bool {
    attrs.iter().all(LegacyAttribute::is_preset_instance_name)
}

/// Build the composite constraint for one entity type.
///
/// Members are the attributes in load order. The owner starts at
/// `default_owner` and is replaced by each attribute's owner in turn, so the
/// last attribute decides it.
pub fn derive_constraint(
    object_id: &str,
    attrs: &[LegacyAttribute],
    default_owner: &str,
    now: Timestamp,
) -> UniqueConstraint {
    let mut keys = Vec::with_capacity(attrs.len());
    let mut owner_id = default_owner;
    for attr in attrs {
        keys.push(UniqueKey::property(member_id(attr)));
        owner_id = attr.owner_id.as_str();
    }

    if attrs.iter().any(|a| a.owner_id != owner_id) {
        tracing::warn!(
            object_id,
            owner_id,
            "Unique attributes span several owners, using the last one"
        );
    }

    UniqueConstraint::new(object_id, keys, true, false, owner_id, now)
}

/// One derived constraint per entity type with unique-flagged attributes,
/// skipping types that only flag the preset instance name.
pub fn derived_constraints(
    index: &AttributeIndex,
    default_owner: &str,
    now: Timestamp,
) -> Vec<UniqueConstraint> {
    let mut uniques = Vec::new();
    for (object_id, attrs) in index.unique_by_object() {
        if is_instance_name_only(attrs) {
            tracing::debug!(object_id, "Skipping type whose only unique field is the instance name");
            continue;
        }
        uniques.push(derive_constraint(object_id, attrs, default_owner, now));
    }
    uniques
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdb_core::constants::FIELD_INST_NAME;
    use cmdb_test_utils::fixtures::attribute;
    use chrono::Utc;

    #[test]
    fn test_predicate_true_for_preset_instance_name_only() {
        let attrs = vec![attribute(1, "zone", FIELD_INST_NAME).preset().unique().build()];
        assert!(is_instance_name_only(&attrs));
    }

    #[test]
    fn test_predicate_false_for_non_preset_instance_name() {
        let attrs = vec![attribute(1, "zone", FIELD_INST_NAME).unique().build()];
        assert!(!is_instance_name_only(&attrs));
    }

    #[test]
    fn test_predicate_false_for_preset_other_field() {
        let attrs = vec![attribute(1, "zone", "zone_code").preset().unique().build()];
        assert!(!is_instance_name_only(&attrs));
    }

    #[test]
    fn test_predicate_false_when_any_attribute_disqualifies() {
        let attrs = vec![
            attribute(1, "zone", FIELD_INST_NAME).preset().unique().build(),
            attribute(2, "zone", "zone_code").unique().build(),
        ];
        assert!(!is_instance_name_only(&attrs));
    }

    #[test]
    fn test_custom_type_yields_one_constraint_in_load_order() {
        let attrs = vec![
            attribute(31, "server", "serial").unique().build(),
            attribute(32, "server", "hostname").build(),
            attribute(33, "server", "rack").unique().build(),
        ];
        let index = AttributeIndex::build(&attrs);

        let uniques = derived_constraints(&index, "0", Utc::now());

        assert_eq!(uniques.len(), 1);
        let unique = &uniques[0];
        assert_eq!(unique.object_id, "server");
        assert_eq!(unique.key_ids(), vec![31, 33]);
        assert!(unique.must_check);
        assert!(!unique.is_pre);
    }

    #[test]
    fn test_instance_name_only_type_is_skipped() {
        let attrs = vec![
            attribute(41, "zone", FIELD_INST_NAME).preset().unique().build(),
            attribute(42, "server", "serial").unique().build(),
        ];
        let index = AttributeIndex::build(&attrs);

        let uniques = derived_constraints(&index, "0", Utc::now());

        assert_eq!(uniques.len(), 1);
        assert_eq!(uniques[0].object_id, "server");
    }

    #[test]
    fn test_owner_comes_from_last_attribute() {
        let attrs = vec![
            attribute(1, "server", "serial").unique().owner("tenant-a").build(),
            attribute(2, "server", "rack").unique().owner("tenant-b").build(),
        ];
        let unique = derive_constraint("server", &attrs, "0", Utc::now());
        assert_eq!(unique.owner_id, "tenant-b");
    }

    #[test]
    fn test_negative_attribute_id_becomes_zero_member() {
        let attrs = vec![
            attribute(-1, "server", "serial").unique().build(),
            attribute(2, "server", "rack").unique().build(),
        ];
        let unique = derive_constraint("server", &attrs, "0", Utc::now());
        assert_eq!(unique.key_ids(), vec![0, 2]);
    }

    #[test]
    fn test_types_emitted_in_first_seen_order() {
        let attrs = vec![
            attribute(1, "b_type", "x").unique().build(),
            attribute(2, "a_type", "y").unique().build(),
            attribute(3, "b_type", "z").unique().build(),
        ];
        let index = AttributeIndex::build(&attrs);

        let objects: Vec<String> = derived_constraints(&index, "0", Utc::now())
            .into_iter()
            .map(|u| u.object_id)
            .collect();
        assert_eq!(objects, vec!["b_type".to_string(), "a_type".to_string()]);
    }

    #[test]
    fn test_no_unique_attributes_no_constraints() {
        let attrs = vec![attribute(1, "host", "bk_asset_id").build()];
        let index = AttributeIndex::build(&attrs);
        assert!(derived_constraints(&index, "0", Utc::now()).is_empty());
    }
}
