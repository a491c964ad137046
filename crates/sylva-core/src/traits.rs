//! The storage seam between the field engine and a concrete backend.
//!
//! Implementations are expected to run every call inside one unit of work
//! owned by the caller (for PostgreSQL, a single transaction), so a failed
//! engine operation leaves no partial writes once the caller rolls back.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{FieldDefinition, FieldValue, OwnerKind};

// =============================================================================
// FIELD STORE
// =============================================================================

/// Row access for field definitions and field values of every owner kind.
///
/// Methods take `&mut self`: a store is a handle on one in-flight unit of
/// work, not a shared pool.
#[async_trait]
pub trait FieldStore: Send {
    /// Fetch a definition by id, deleted or not.
    async fn get_definition(
        &mut self,
        kind: OwnerKind,
        field_id: Uuid,
    ) -> Result<Option<FieldDefinition>>;

    /// All definitions of a scope. Order is unspecified.
    async fn list_definitions(
        &mut self,
        kind: OwnerKind,
        scope_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<FieldDefinition>>;

    /// Definitions with the given ids, deleted ones included. Unknown ids
    /// are silently absent from the result.
    async fn get_definitions_by_ids(
        &mut self,
        kind: OwnerKind,
        ids: &[Uuid],
    ) -> Result<Vec<FieldDefinition>>;

    async fn insert_definition(&mut self, definition: &FieldDefinition) -> Result<()>;

    /// Overwrite every mutable attribute of an existing definition.
    async fn update_definition(&mut self, definition: &FieldDefinition) -> Result<()>;

    /// Number of values referencing a definition, across all owners.
    async fn count_values_for_field(&mut self, kind: OwnerKind, field_id: Uuid) -> Result<i64>;

    /// Subset of `field_ids` referenced by at least one value.
    async fn locked_field_ids(
        &mut self,
        kind: OwnerKind,
        field_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>> {
        let mut locked = HashSet::new();
        for id in field_ids {
            if self.count_values_for_field(kind, *id).await? > 0 {
                locked.insert(*id);
            }
        }
        Ok(locked)
    }

    /// Every stored value of an owner, including values of deleted fields.
    async fn list_values(&mut self, kind: OwnerKind, owner_id: Uuid) -> Result<Vec<FieldValue>>;

    /// Make `values` the owner's complete value set.
    ///
    /// Rows for fields absent from `values` are removed. Rows whose
    /// (owner, field) pair already exists keep their `created_at`.
    async fn replace_values(
        &mut self,
        kind: OwnerKind,
        owner_id: Uuid,
        values: &[FieldValue],
    ) -> Result<()>;

    /// Hard-delete all values of an owner. Returns the number removed.
    async fn delete_values(&mut self, kind: OwnerKind, owner_id: Uuid) -> Result<u64>;
}
