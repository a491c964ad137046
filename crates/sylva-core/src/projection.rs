//! Projection of a scope's definitions merged with one owner's values.
//!
//! Pure functions over already-loaded rows; the engine does the fetching.

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{FieldDefinition, FieldValue, ProjectedField};

/// Listing order for definitions: display order, then name, then id so
/// equal (order, name) pairs among deleted rows still sort deterministically.
pub fn definition_order(a: &FieldDefinition, b: &FieldDefinition) -> Ordering {
    a.display_order
        .cmp(&b.display_order)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_definitions(definitions: &mut [FieldDefinition]) {
    definitions.sort_by(definition_order);
}

/// Merge a scope's active definitions with an owner's values.
///
/// Emits exactly one row per active definition, in listing order. Rows
/// without a stored value are placeholders. Values for fields outside
/// `definitions` (other scopes, deleted fields) are not shown.
pub fn project(
    owner_id: Uuid,
    definitions: &[FieldDefinition],
    values: &[FieldValue],
) -> Vec<ProjectedField> {
    let by_field: HashMap<Uuid, &FieldValue> = values.iter().map(|v| (v.field_id, v)).collect();

    let mut active: Vec<&FieldDefinition> = definitions.iter().filter(|d| d.is_active()).collect();
    active.sort_by(|a, b| definition_order(a, b));

    active
        .into_iter()
        .map(|def| match by_field.get(&def.id) {
            Some(value) => row(def, value),
            None => ProjectedField {
                id: None,
                owner_id,
                field_id: def.id,
                field_name: def.name.clone(),
                value_kind: def.value_kind,
                is_required: def.is_required,
                display_order: def.display_order,
                is_deleted: false,
                value: None,
                created_at: None,
                updated_at: None,
            },
        })
        .collect()
}

/// Every stored value of an owner joined with its definition, deleted
/// definitions included. No placeholders.
///
/// `definitions` must contain the definition of each value; values whose
/// definition is absent are skipped.
pub fn project_stored(definitions: &[FieldDefinition], values: &[FieldValue]) -> Vec<ProjectedField> {
    let by_id: HashMap<Uuid, &FieldDefinition> = definitions.iter().map(|d| (d.id, d)).collect();

    let mut joined: Vec<(&FieldDefinition, &FieldValue)> = values
        .iter()
        .filter_map(|v| by_id.get(&v.field_id).map(|d| (*d, v)))
        .collect();
    joined.sort_by(|(a, _), (b, _)| definition_order(a, b));

    joined.into_iter().map(|(def, value)| row(def, value)).collect()
}

fn row(def: &FieldDefinition, value: &FieldValue) -> ProjectedField {
    ProjectedField {
        id: Some(value.id),
        owner_id: value.owner_id,
        field_id: def.id,
        field_name: def.name.clone(),
        value_kind: def.value_kind,
        is_required: def.is_required,
        display_order: def.display_order,
        is_deleted: def.is_deleted,
        value: Some(value.value.clone()),
        created_at: Some(value.created_at),
        updated_at: Some(value.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OwnerKind, StoredValue, ValueKind};
    use bigdecimal::BigDecimal;
    use chrono::Utc;

    fn def(name: &str, kind: ValueKind, order: i32) -> FieldDefinition {
        FieldDefinition {
            id: Uuid::now_v7(),
            owner_kind: OwnerKind::Plant,
            scope_id: Uuid::nil(),
            name: name.to_string(),
            value_kind: kind,
            is_required: false,
            display_order: order,
            min_length: None,
            max_length: None,
            pattern: None,
            min_value: None,
            max_value: None,
            options: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
            created_by: Uuid::nil(),
        }
    }

    fn value(owner_id: Uuid, field: &FieldDefinition, v: StoredValue) -> FieldValue {
        let now = Utc::now();
        FieldValue {
            id: Uuid::now_v7(),
            owner_id,
            field_id: field.id,
            value: v,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_project_emits_placeholder_for_unset_fields() {
        let owner = Uuid::new_v4();
        let height = def("Height", ValueKind::Number, 0);
        let notes = def("Notes", ValueKind::String, 0);
        let stored = value(owner, &height, StoredValue::Number(BigDecimal::from(120)));

        let rows = project(owner, &[notes.clone(), height.clone()], &[stored.clone()]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field_name, "Height");
        assert_eq!(rows[0].id, Some(stored.id));
        assert_eq!(rows[0].value, Some(StoredValue::Number(BigDecimal::from(120))));
        assert_eq!(rows[1].field_name, "Notes");
        assert!(rows[1].is_placeholder());
        assert!(rows[1].value.is_none());
        assert!(rows[1].created_at.is_none());
        assert_eq!(rows[1].owner_id, owner);
    }

    #[test]
    fn test_project_orders_by_display_order_then_name() {
        let owner = Uuid::new_v4();
        let defs = vec![
            def("b", ValueKind::String, 1),
            def("z", ValueKind::String, 0),
            def("a", ValueKind::String, 1),
        ];
        let names: Vec<_> = project(owner, &defs, &[])
            .into_iter()
            .map(|r| r.field_name)
            .collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_project_skips_deleted_definitions_and_foreign_values() {
        let owner = Uuid::new_v4();
        let kept = def("Kept", ValueKind::String, 0);
        let mut gone = def("Gone", ValueKind::String, 0);
        gone.is_deleted = true;
        let foreign = def("Elsewhere", ValueKind::String, 0);

        let values = vec![
            value(owner, &gone, StoredValue::String("old".into())),
            value(owner, &foreign, StoredValue::String("other".into())),
        ];
        let rows = project(owner, &[kept.clone(), gone], &values);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].field_id, kept.id);
        assert!(rows[0].is_placeholder());
    }

    #[test]
    fn test_project_is_stable() {
        let owner = Uuid::new_v4();
        let defs = vec![def("x", ValueKind::String, 0), def("y", ValueKind::Number, 0)];
        let values = vec![value(owner, &defs[1], StoredValue::Number(BigDecimal::from(3)))];
        assert_eq!(project(owner, &defs, &values), project(owner, &defs, &values));
    }

    #[test]
    fn test_project_stored_includes_deleted_definitions() {
        let owner = Uuid::new_v4();
        let live = def("Live", ValueKind::String, 2);
        let mut gone = def("Gone", ValueKind::String, 1);
        gone.is_deleted = true;
        gone.deleted_at = Some(Utc::now());
        let unset = def("Unset", ValueKind::String, 0);

        let values = vec![
            value(owner, &live, StoredValue::String("now".into())),
            value(owner, &gone, StoredValue::String("then".into())),
        ];
        let rows = project_stored(&[live, gone, unset], &values);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field_name, "Gone");
        assert!(rows[0].is_deleted);
        assert_eq!(rows[0].value, Some(StoredValue::String("then".into())));
        assert_eq!(rows[1].field_name, "Live");
        assert!(!rows[1].is_deleted);
    }
}
