//! In-process [`FieldStore`] backed by hash maps.
//!
//! Used by the engine tests and by embedders that keep custom fields in
//! memory. Writes apply immediately; there is no rollback, so callers that
//! need all-or-nothing behavior rely on the engine validating before it
//! writes.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{FieldDefinition, FieldValue, OwnerKind};
use crate::traits::FieldStore;

#[derive(Debug, Clone, Default)]
pub struct MemoryFieldStore {
    definitions: HashMap<Uuid, FieldDefinition>,
    values: HashMap<(OwnerKind, Uuid), Vec<FieldValue>>,
}

impl MemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored values across all owners of a kind.
    pub fn value_count(&self, kind: OwnerKind) -> usize {
        self.values
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, rows)| rows.len())
            .sum()
    }

    fn definition_of_kind(&self, kind: OwnerKind, id: &Uuid) -> Option<&FieldDefinition> {
        self.definitions.get(id).filter(|d| d.owner_kind == kind)
    }

    /// Mirror of the partial unique index on active names.
    fn check_active_name(&self, definition: &FieldDefinition) -> Result<()> {
        if !definition.is_active() {
            return Ok(());
        }
        let clash = self.definitions.values().any(|d| {
            d.id != definition.id
                && d.is_active()
                && d.owner_kind == definition.owner_kind
                && d.scope_id == definition.scope_id
                && d.name == definition.name
        });
        if clash {
            return Err(Error::SchemaConflict {
                scope_id: definition.scope_id,
                name: definition.name.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FieldStore for MemoryFieldStore {
    async fn get_definition(
        &mut self,
        kind: OwnerKind,
        field_id: Uuid,
    ) -> Result<Option<FieldDefinition>> {
        Ok(self.definition_of_kind(kind, &field_id).cloned())
    }

    async fn list_definitions(
        &mut self,
        kind: OwnerKind,
        scope_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<FieldDefinition>> {
        Ok(self
            .definitions
            .values()
            .filter(|d| d.owner_kind == kind && d.scope_id == scope_id)
            .filter(|d| include_deleted || d.is_active())
            .cloned()
            .collect())
    }

    async fn get_definitions_by_ids(
        &mut self,
        kind: OwnerKind,
        ids: &[Uuid],
    ) -> Result<Vec<FieldDefinition>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.definition_of_kind(kind, id))
            .cloned()
            .collect())
    }

    async fn insert_definition(&mut self, definition: &FieldDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.id) {
            return Err(Error::Internal(format!(
                "definition {} already exists",
                definition.id
            )));
        }
        self.check_active_name(definition)?;
        self.definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn update_definition(&mut self, definition: &FieldDefinition) -> Result<()> {
        if self.definition_of_kind(definition.owner_kind, &definition.id).is_none() {
            return Err(Error::NotFound(format!("Field {}", definition.id)));
        }
        self.check_active_name(definition)?;
        self.definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn count_values_for_field(&mut self, kind: OwnerKind, field_id: Uuid) -> Result<i64> {
        let count = self
            .values
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .flat_map(|(_, rows)| rows.iter())
            .filter(|v| v.field_id == field_id)
            .count();
        Ok(count as i64)
    }

    async fn list_values(&mut self, kind: OwnerKind, owner_id: Uuid) -> Result<Vec<FieldValue>> {
        Ok(self
            .values
            .get(&(kind, owner_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_values(
        &mut self,
        kind: OwnerKind,
        owner_id: Uuid,
        values: &[FieldValue],
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for value in values {
            if self.definition_of_kind(kind, &value.field_id).is_none() {
                return Err(Error::Internal(format!(
                    "value references unknown definition {}",
                    value.field_id
                )));
            }
            if !seen.insert(value.field_id) {
                return Err(Error::Internal(format!(
                    "duplicate value for field {}",
                    value.field_id
                )));
            }
        }

        let previous: HashMap<Uuid, FieldValue> = self
            .values
            .remove(&(kind, owner_id))
            .unwrap_or_default()
            .into_iter()
            .map(|v| (v.field_id, v))
            .collect();
        let rows: Vec<FieldValue> = values
            .iter()
            .map(|v| match previous.get(&v.field_id) {
                Some(prior) => FieldValue {
                    created_at: prior.created_at,
                    ..v.clone()
                },
                None => v.clone(),
            })
            .collect();
        if !rows.is_empty() {
            self.values.insert((kind, owner_id), rows);
        }
        Ok(())
    }

    async fn delete_values(&mut self, kind: OwnerKind, owner_id: Uuid) -> Result<u64> {
        Ok(self
            .values
            .remove(&(kind, owner_id))
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StoredValue, ValueKind};
    use chrono::{Duration, Utc};

    fn definition(kind: OwnerKind, scope_id: Uuid, name: &str) -> FieldDefinition {
        FieldDefinition {
            id: Uuid::now_v7(),
            owner_kind: kind,
            scope_id,
            name: name.to_string(),
            value_kind: ValueKind::String,
            is_required: false,
            display_order: 0,
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

    fn value(owner_id: Uuid, field_id: Uuid, text: &str) -> FieldValue {
        let now = Utc::now();
        FieldValue {
            id: Uuid::now_v7(),
            owner_id,
            field_id,
            value: StoredValue::String(text.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_kinds_are_isolated() {
        let mut store = MemoryFieldStore::new();
        let scope = Uuid::new_v4();
        let plant_field = definition(OwnerKind::Plant, scope, "Notes");
        store.insert_definition(&plant_field).await.unwrap();

        // Same scope id and name under a different kind is not a clash
        let accession_field = definition(OwnerKind::Accession, scope, "Notes");
        store.insert_definition(&accession_field).await.unwrap();

        assert!(store
            .get_definition(OwnerKind::Accession, plant_field.id)
            .await
            .unwrap()
            .is_none());
        let listed = store
            .list_definitions(OwnerKind::Plant, scope, true)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, plant_field.id);
    }

    #[tokio::test]
    async fn test_active_name_clash_is_rejected() {
        let mut store = MemoryFieldStore::new();
        let scope = Uuid::new_v4();
        let mut first = definition(OwnerKind::Location, scope, "Row");
        store.insert_definition(&first).await.unwrap();

        let second = definition(OwnerKind::Location, scope, "Row");
        let err = store.insert_definition(&second).await.unwrap_err();
        assert!(matches!(err, Error::SchemaConflict { .. }));

        first.is_deleted = true;
        store.update_definition(&first).await.unwrap();
        store.insert_definition(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_values_keeps_created_at_and_drops_missing() {
        let mut store = MemoryFieldStore::new();
        let scope = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let a = definition(OwnerKind::Event, scope, "a");
        let b = definition(OwnerKind::Event, scope, "b");
        store.insert_definition(&a).await.unwrap();
        store.insert_definition(&b).await.unwrap();

        let mut first = value(owner, a.id, "one");
        first.created_at = Utc::now() - Duration::days(1);
        let original_created = first.created_at;
        store
            .replace_values(OwnerKind::Event, owner, &[first, value(owner, b.id, "two")])
            .await
            .unwrap();

        let mut again = value(owner, a.id, "uno");
        again.created_at = Utc::now();
        store
            .replace_values(OwnerKind::Event, owner, &[again])
            .await
            .unwrap();

        let rows = store.list_values(OwnerKind::Event, owner).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, StoredValue::String("uno".into()));
        assert_eq!(rows[0].created_at, original_created);
        assert_eq!(store.count_values_for_field(OwnerKind::Event, b.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_values_reports_count() {
        let mut store = MemoryFieldStore::new();
        let scope = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let a = definition(OwnerKind::Plant, scope, "a");
        store.insert_definition(&a).await.unwrap();
        store
            .replace_values(OwnerKind::Plant, owner, &[value(owner, a.id, "x")])
            .await
            .unwrap();

        assert_eq!(store.delete_values(OwnerKind::Plant, owner).await.unwrap(), 1);
        assert_eq!(store.delete_values(OwnerKind::Plant, owner).await.unwrap(), 0);
        assert_eq!(store.value_count(OwnerKind::Plant), 0);
    }
}
