//! The custom field engine: definition CRUD, lock checks, the value write
//! path and projection, for any owner kind.
//!
//! The engine never opens or commits a unit of work. It borrows a
//! [`FieldStore`] that the caller has bound to one (for PostgreSQL, a
//! transaction) and the caller decides whether to commit.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    CreateFieldDefinitionRequest, FieldDefinition, FieldDefinitionView, FieldValue,
    FieldValueInput, OwnerKind, ProjectedField, SyncFieldDefinition, UpdateFieldDefinitionRequest,
};
use crate::projection;
use crate::traits::FieldStore;
use crate::validation::{self, ensure_owner_kind};

/// Custom field operations for one owner kind over a borrowed store.
pub struct FieldEngine<'s, S: FieldStore + ?Sized> {
    store: &'s mut S,
    kind: OwnerKind,
}

impl<'s, S: FieldStore + ?Sized> FieldEngine<'s, S> {
    pub fn new(store: &'s mut S, kind: OwnerKind) -> Self {
        Self { store, kind }
    }

    pub fn owner_kind(&self) -> OwnerKind {
        self.kind
    }

    // =========================================================================
    // DEFINITION READS
    // =========================================================================

    /// Definitions of a scope in listing order, each with its lock state.
    pub async fn list_definitions(
        &mut self,
        scope_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<FieldDefinitionView>> {
        let mut definitions = self
            .store
            .list_definitions(self.kind, scope_id, include_deleted)
            .await?;
        projection::sort_definitions(&mut definitions);

        let ids: Vec<Uuid> = definitions.iter().map(|d| d.id).collect();
        let locked = self.store.locked_field_ids(self.kind, &ids).await?;

        Ok(definitions
            .into_iter()
            .map(|definition| FieldDefinitionView {
                is_locked: locked.contains(&definition.id),
                definition,
            })
            .collect())
    }

    /// Active definitions of a scope in listing order.
    pub async fn active_definitions(&mut self, scope_id: Uuid) -> Result<Vec<FieldDefinition>> {
        let mut definitions = self
            .store
            .list_definitions(self.kind, scope_id, false)
            .await?;
        definitions.retain(FieldDefinition::is_active);
        projection::sort_definitions(&mut definitions);
        Ok(definitions)
    }

    pub async fn get_definition(&mut self, field_id: Uuid) -> Result<FieldDefinitionView> {
        let definition = self.fetch(field_id).await?;
        let is_locked = self.is_locked(field_id).await?;
        Ok(FieldDefinitionView {
            definition,
            is_locked,
        })
    }

    /// Like [`get_definition`](Self::get_definition), but fails when the
    /// definition belongs to another scope.
    pub async fn get_definition_in_scope(
        &mut self,
        scope_id: Uuid,
        field_id: Uuid,
    ) -> Result<FieldDefinitionView> {
        let view = self.get_definition(field_id).await?;
        if view.definition.scope_id != scope_id {
            return Err(Error::InvalidInput(format!(
                "Field {} does not belong to this {}",
                field_id,
                self.kind.scope_kind()
            )));
        }
        Ok(view)
    }

    /// True once any value references the definition.
    pub async fn is_locked(&mut self, field_id: Uuid) -> Result<bool> {
        let count = self.store.count_values_for_field(self.kind, field_id).await?;
        debug!(
            subsystem = "fields",
            component = "engine",
            op = "lock_check",
            owner_kind = %self.kind,
            field_id = %field_id,
            value_count = count,
            "Checked field lock"
        );
        Ok(count > 0)
    }

    async fn fetch(&mut self, field_id: Uuid) -> Result<FieldDefinition> {
        let definition = self
            .store
            .get_definition(self.kind, field_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Field {}", field_id)))?;
        ensure_owner_kind(&definition, self.kind)?;
        Ok(definition)
    }

    // =========================================================================
    // DEFINITION WRITES
    // =========================================================================

    /// Create one definition in a scope.
    pub async fn create_definition(
        &mut self,
        scope_id: Uuid,
        request: CreateFieldDefinitionRequest,
        created_by: Uuid,
    ) -> Result<FieldDefinition> {
        let mut created = self
            .create_definitions(scope_id, vec![request], created_by)
            .await?;
        created
            .pop()
            .ok_or_else(|| Error::Internal("batch create returned no definition".into()))
    }

    /// Create several definitions in a scope, all or nothing.
    ///
    /// Every definition is checked, including name uniqueness within the
    /// batch and against active definitions, before anything is written.
    pub async fn create_definitions(
        &mut self,
        scope_id: Uuid,
        requests: Vec<CreateFieldDefinitionRequest>,
        created_by: Uuid,
    ) -> Result<Vec<FieldDefinition>> {
        let mut taken: HashSet<String> = self
            .active_definitions(scope_id)
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect();

        let mut staged = Vec::with_capacity(requests.len());
        for request in requests {
            let definition = self.build_definition(scope_id, request, created_by);
            validation::validate_definition(&definition)?;
            if !taken.insert(definition.name.clone()) {
                return Err(self.name_conflict(scope_id, &definition.name));
            }
            staged.push(definition);
        }

        for definition in &staged {
            self.store.insert_definition(definition).await?;
            info!(
                subsystem = "fields",
                component = "engine",
                op = "create_definition",
                owner_kind = %self.kind,
                scope_id = %scope_id,
                field_id = %definition.id,
                field_name = %definition.name,
                value_kind = %definition.value_kind,
                "Field definition created"
            );
        }
        Ok(staged)
    }

    /// Apply a partial update to a definition.
    ///
    /// A kind change on a locked definition is rejected; a rename must not
    /// collide with another active definition of the scope. Bounds may be
    /// tightened freely; stored values are not rechecked.
    pub async fn update_definition(
        &mut self,
        field_id: Uuid,
        request: UpdateFieldDefinitionRequest,
    ) -> Result<FieldDefinition> {
        let current = self.fetch(field_id).await?;
        let mut updated = current.clone();

        if let Some(name) = request.name {
            updated.name = name;
        }
        if let Some(kind) = request.value_kind {
            updated.value_kind = kind;
        }
        if let Some(required) = request.is_required {
            updated.is_required = required;
        }
        if let Some(order) = request.display_order {
            updated.display_order = order;
        }
        if let Some(min_length) = request.min_length {
            updated.min_length = min_length;
        }
        if let Some(max_length) = request.max_length {
            updated.max_length = max_length;
        }
        if let Some(pattern) = request.pattern {
            updated.pattern = pattern;
        }
        if let Some(min_value) = request.min_value {
            updated.min_value = min_value;
        }
        if let Some(max_value) = request.max_value {
            updated.max_value = max_value;
        }
        if let Some(options) = request.options {
            updated.options = options;
        }

        self.check_replacement(&current, &updated).await?;
        validation::validate_definition(&updated)?;

        if updated.is_active() && updated.name != current.name {
            let clash = self
                .active_definitions(current.scope_id)
                .await?
                .iter()
                .any(|d| d.id != field_id && d.name == updated.name);
            if clash {
                return Err(self.name_conflict(current.scope_id, &updated.name));
            }
        }

        self.store.update_definition(&updated).await?;
        info!(
            subsystem = "fields",
            component = "engine",
            op = "update_definition",
            owner_kind = %self.kind,
            scope_id = %updated.scope_id,
            field_id = %field_id,
            field_name = %updated.name,
            "Field definition updated"
        );
        Ok(updated)
    }

    /// Soft-delete a definition. Its stored values are left untouched.
    ///
    /// Deleting an already-deleted definition returns it unchanged.
    pub async fn soft_delete_definition(&mut self, field_id: Uuid) -> Result<FieldDefinition> {
        let mut definition = self.fetch(field_id).await?;
        if definition.is_deleted {
            return Ok(definition);
        }
        self.mark_deleted(&mut definition).await?;
        Ok(definition)
    }

    /// Soft-delete every active definition of a scope. Returns how many
    /// were deleted.
    pub async fn soft_delete_scope(&mut self, scope_id: Uuid) -> Result<usize> {
        let active = self.active_definitions(scope_id).await?;
        let count = active.len();
        for mut definition in active {
            self.mark_deleted(&mut definition).await?;
        }
        info!(
            subsystem = "fields",
            component = "engine",
            op = "soft_delete_scope",
            owner_kind = %self.kind,
            scope_id = %scope_id,
            result_count = count,
            "Scope fields deleted"
        );
        Ok(count)
    }

    async fn mark_deleted(&mut self, definition: &mut FieldDefinition) -> Result<()> {
        definition.is_deleted = true;
        definition.deleted_at = Some(Utc::now());
        self.store.update_definition(definition).await?;
        info!(
            subsystem = "fields",
            component = "engine",
            op = "soft_delete_definition",
            owner_kind = %self.kind,
            scope_id = %definition.scope_id,
            field_id = %definition.id,
            field_name = %definition.name,
            "Field definition deleted"
        );
        Ok(())
    }

    /// Replace a scope's field list.
    ///
    /// Entries whose id names a definition of the scope overwrite all of its
    /// attributes; other entries create new definitions; active definitions
    /// not named by any entry are soft-deleted. Returns the resulting active
    /// definitions in listing order.
    pub async fn sync_definitions(
        &mut self,
        scope_id: Uuid,
        desired: Vec<SyncFieldDefinition>,
        created_by: Uuid,
    ) -> Result<Vec<FieldDefinition>> {
        let existing: HashMap<Uuid, FieldDefinition> = self
            .store
            .list_definitions(self.kind, scope_id, true)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        let named: HashSet<Uuid> = desired.iter().filter_map(|e| e.id).collect();
        let mut removals: Vec<FieldDefinition> = existing
            .values()
            .filter(|d| d.is_active() && !named.contains(&d.id))
            .cloned()
            .collect();
        projection::sort_definitions(&mut removals);

        let mut updates = Vec::new();
        let mut creations = Vec::new();
        for entry in desired {
            match entry.id.and_then(|id| existing.get(&id)) {
                Some(current) => {
                    let mut updated = self.build_definition(scope_id, entry.field, current.created_by);
                    updated.id = current.id;
                    updated.created_at = current.created_at;
                    updated.is_deleted = current.is_deleted;
                    updated.deleted_at = current.deleted_at;
                    validation::validate_definition(&updated)?;
                    self.check_replacement(current, &updated).await?;
                    updates.push(updated);
                }
                None => {
                    let created = self.build_definition(scope_id, entry.field, created_by);
                    validation::validate_definition(&created)?;
                    creations.push(created);
                }
            }
        }

        let mut names = HashSet::new();
        for definition in updates.iter().chain(creations.iter()) {
            if definition.is_active() && !names.insert(definition.name.as_str()) {
                return Err(self.name_conflict(scope_id, &definition.name));
            }
        }

        for mut definition in removals {
            self.mark_deleted(&mut definition).await?;
        }
        // Renamed definitions release their old names before any entry takes
        // a new one, so chains and swaps never hold a name twice.
        let parked: Vec<FieldDefinition> = updates
            .iter()
            .filter_map(|d| existing.get(&d.id).filter(|c| c.is_active() && c.name != d.name))
            .map(|current| FieldDefinition {
                is_deleted: true,
                ..current.clone()
            })
            .collect();
        for definition in &parked {
            self.store.update_definition(definition).await?;
        }
        for definition in &updates {
            self.store.update_definition(definition).await?;
        }
        for definition in &creations {
            self.store.insert_definition(definition).await?;
        }

        info!(
            subsystem = "fields",
            component = "engine",
            op = "sync_definitions",
            owner_kind = %self.kind,
            scope_id = %scope_id,
            updated = updates.len(),
            renamed = parked.len(),
            created = creations.len(),
            "Scope fields synchronized"
        );
        self.active_definitions(scope_id).await
    }

    fn build_definition(
        &self,
        scope_id: Uuid,
        request: CreateFieldDefinitionRequest,
        created_by: Uuid,
    ) -> FieldDefinition {
        FieldDefinition {
            id: Uuid::now_v7(),
            owner_kind: self.kind,
            scope_id,
            name: request.name,
            value_kind: request.value_kind,
            is_required: request.is_required,
            display_order: request.display_order,
            min_length: request.min_length,
            max_length: request.max_length,
            pattern: request.pattern,
            min_value: request.min_value,
            max_value: request.max_value,
            options: request.options,
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
            created_by,
        }
    }

    /// Reject a kind change on a locked definition.
    async fn check_replacement(
        &mut self,
        current: &FieldDefinition,
        updated: &FieldDefinition,
    ) -> Result<()> {
        if updated.value_kind != current.value_kind && self.is_locked(current.id).await? {
            warn!(
                subsystem = "fields",
                component = "engine",
                op = "update_definition",
                owner_kind = %self.kind,
                field_id = %current.id,
                from = %current.value_kind,
                to = %updated.value_kind,
                "Rejected type change on locked field"
            );
            return Err(Error::LockedTypeChange {
                field_id: current.id,
                name: current.name.clone(),
            });
        }
        Ok(())
    }

    fn name_conflict(&self, scope_id: Uuid, name: &str) -> Error {
        warn!(
            subsystem = "fields",
            component = "engine",
            owner_kind = %self.kind,
            scope_id = %scope_id,
            field_name = %name,
            "Rejected duplicate field name"
        );
        Error::SchemaConflict {
            scope_id,
            name: name.to_string(),
        }
    }

    // =========================================================================
    // VALUES
    // =========================================================================

    /// Fail unless every active required field of the scope is submitted.
    pub async fn validate_required(&mut self, scope_id: Uuid, submitted: &HashSet<Uuid>) -> Result<()> {
        let definitions = self.active_definitions(scope_id).await?;
        validation::validate_required(&definitions, submitted).inspect_err(|e| {
            warn!(
                subsystem = "fields",
                component = "engine",
                op = "validate_required",
                owner_kind = %self.kind,
                scope_id = %scope_id,
                error = %e,
                "Submission is missing required fields"
            );
        })
    }

    /// Validate a submission and make it the owner's complete value set.
    ///
    /// Nothing is written unless every check passes. Values of fields that
    /// are not submitted are removed; resubmitted fields keep their value
    /// id and creation time.
    pub async fn apply_values(
        &mut self,
        owner_id: Uuid,
        scope_id: Option<Uuid>,
        inputs: &[FieldValueInput],
    ) -> Result<Vec<FieldValue>> {
        let start = Instant::now();
        let Some(scope_id) = scope_id else {
            return Err(Error::InvalidInput(format!(
                "cannot set field values for {} {} without a {}",
                self.kind,
                owner_id,
                self.kind.scope_kind()
            )));
        };

        let mut submitted = HashSet::with_capacity(inputs.len());
        for input in inputs {
            if !submitted.insert(input.field_id) {
                return Err(Error::InvalidInput(format!(
                    "Field {} submitted more than once",
                    input.field_id
                )));
            }
        }

        let definitions = self.active_definitions(scope_id).await?;
        validation::validate_required(&definitions, &submitted).inspect_err(|e| {
            warn!(
                subsystem = "fields",
                component = "engine",
                op = "apply_values",
                owner_kind = %self.kind,
                owner_id = %owner_id,
                error = %e,
                "Rejected field values"
            );
        })?;

        let by_id: HashMap<Uuid, &FieldDefinition> =
            definitions.iter().map(|d| (d.id, d)).collect();
        let mut validated = Vec::with_capacity(inputs.len());
        for input in inputs {
            let Some(definition) = by_id.get(&input.field_id) else {
                warn!(
                    subsystem = "fields",
                    component = "engine",
                    op = "apply_values",
                    owner_kind = %self.kind,
                    owner_id = %owner_id,
                    field_id = %input.field_id,
                    "Rejected value for unknown field"
                );
                return Err(Error::UnknownField(input.field_id));
            };
            let value = validation::validate_value(definition, &input.value).inspect_err(|e| {
                warn!(
                    subsystem = "fields",
                    component = "engine",
                    op = "apply_values",
                    owner_kind = %self.kind,
                    owner_id = %owner_id,
                    field_id = %input.field_id,
                    error = %e,
                    "Rejected field value"
                );
            })?;
            validated.push((input.field_id, value));
        }

        let previous: HashMap<Uuid, FieldValue> = self
            .store
            .list_values(self.kind, owner_id)
            .await?
            .into_iter()
            .map(|v| (v.field_id, v))
            .collect();

        let now = Utc::now();
        let staged: Vec<FieldValue> = validated
            .into_iter()
            .map(|(field_id, value)| match previous.get(&field_id) {
                Some(prior) => FieldValue {
                    id: prior.id,
                    owner_id,
                    field_id,
                    value,
                    created_at: prior.created_at,
                    updated_at: now,
                },
                None => FieldValue {
                    id: Uuid::now_v7(),
                    owner_id,
                    field_id,
                    value,
                    created_at: now,
                    updated_at: now,
                },
            })
            .collect();

        self.store.replace_values(self.kind, owner_id, &staged).await?;
        info!(
            subsystem = "fields",
            component = "engine",
            op = "apply_values",
            owner_kind = %self.kind,
            owner_id = %owner_id,
            scope_id = %scope_id,
            result_count = staged.len(),
            removed = previous.keys().filter(|id| !submitted.contains(id)).count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Field values applied"
        );
        Ok(staged)
    }

    /// Custom fields of an owner for display.
    ///
    /// With a scope: one row per active definition, placeholders for unset
    /// fields. Without one: the owner's stored values only.
    pub async fn project(
        &mut self,
        owner_id: Uuid,
        scope_id: Option<Uuid>,
    ) -> Result<Vec<ProjectedField>> {
        let Some(scope_id) = scope_id else {
            debug!(
                subsystem = "fields",
                component = "engine",
                op = "project",
                owner_kind = %self.kind,
                owner_id = %owner_id,
                mode = "stored_only",
                "Owner has no scope, projecting stored values"
            );
            return self.read_values(owner_id).await;
        };

        let definitions = self.active_definitions(scope_id).await?;
        let values = self.store.list_values(self.kind, owner_id).await?;
        let rows = projection::project(owner_id, &definitions, &values);
        debug!(
            subsystem = "fields",
            component = "engine",
            op = "project",
            owner_kind = %self.kind,
            owner_id = %owner_id,
            scope_id = %scope_id,
            mode = "merged",
            result_count = rows.len(),
            "Projected custom fields"
        );
        Ok(rows)
    }

    /// Every stored value of an owner with its definition's metadata,
    /// including values of soft-deleted definitions.
    pub async fn read_values(&mut self, owner_id: Uuid) -> Result<Vec<ProjectedField>> {
        let values = self.store.list_values(self.kind, owner_id).await?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = values
            .iter()
            .map(|v| v.field_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let definitions = self.store.get_definitions_by_ids(self.kind, &ids).await?;
        Ok(projection::project_stored(&definitions, &values))
    }

    /// Hard-delete all values of an owner, as when the owner itself is
    /// hard-deleted.
    pub async fn clear_values(&mut self, owner_id: Uuid) -> Result<u64> {
        let removed = self.store.delete_values(self.kind, owner_id).await?;
        info!(
            subsystem = "fields",
            component = "engine",
            op = "clear_values",
            owner_kind = %self.kind,
            owner_id = %owner_id,
            result_count = removed,
            "Field values cleared"
        );
        Ok(removed)
    }
}
