//! Pool-level access to custom fields.
//!
//! Each method runs one engine operation in its own transaction and
//! commits on success. Callers that must combine field writes with their
//! own statements (creating the owner row, then its values) should open a
//! transaction themselves and drive a [`FieldEngine`] over a
//! [`PgFieldStore`] instead.

use std::collections::HashSet;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use sylva_core::{
    CreateFieldDefinitionRequest, Error, FieldDefinition, FieldDefinitionView, FieldEngine,
    FieldValue, FieldValueInput, OwnerKind, ProjectedField, Result, SyncFieldDefinition,
    UpdateFieldDefinitionRequest,
};

use crate::store::PgFieldStore;

/// PostgreSQL field repository.
#[derive(Clone)]
pub struct PgFieldRepository {
    pool: PgPool,
}

impl PgFieldRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(Error::Database)
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<()> {
        tx.commit().await.map_err(Error::Database)
    }

    // =========================================================================
    // DEFINITIONS
    // =========================================================================

    pub async fn list_definitions(
        &self,
        kind: OwnerKind,
        scope_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<FieldDefinitionView>> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .list_definitions(scope_id, include_deleted)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn get_definition(&self, kind: OwnerKind, field_id: Uuid) -> Result<FieldDefinitionView> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .get_definition(field_id)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn get_definition_in_scope(
        &self,
        kind: OwnerKind,
        scope_id: Uuid,
        field_id: Uuid,
    ) -> Result<FieldDefinitionView> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .get_definition_in_scope(scope_id, field_id)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn is_locked(&self, kind: OwnerKind, field_id: Uuid) -> Result<bool> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind).is_locked(field_id).await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn create_definition(
        &self,
        kind: OwnerKind,
        scope_id: Uuid,
        request: CreateFieldDefinitionRequest,
        created_by: Uuid,
    ) -> Result<FieldDefinition> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .create_definition(scope_id, request, created_by)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn create_definitions(
        &self,
        kind: OwnerKind,
        scope_id: Uuid,
        requests: Vec<CreateFieldDefinitionRequest>,
        created_by: Uuid,
    ) -> Result<Vec<FieldDefinition>> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .create_definitions(scope_id, requests, created_by)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn update_definition(
        &self,
        kind: OwnerKind,
        field_id: Uuid,
        request: UpdateFieldDefinitionRequest,
    ) -> Result<FieldDefinition> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .update_definition(field_id, request)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn soft_delete_definition(
        &self,
        kind: OwnerKind,
        field_id: Uuid,
    ) -> Result<FieldDefinition> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .soft_delete_definition(field_id)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn soft_delete_scope(&self, kind: OwnerKind, scope_id: Uuid) -> Result<usize> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .soft_delete_scope(scope_id)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn sync_definitions(
        &self,
        kind: OwnerKind,
        scope_id: Uuid,
        desired: Vec<SyncFieldDefinition>,
        created_by: Uuid,
    ) -> Result<Vec<FieldDefinition>> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .sync_definitions(scope_id, desired, created_by)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    // =========================================================================
    // VALUES
    // =========================================================================

    pub async fn validate_required(
        &self,
        kind: OwnerKind,
        scope_id: Uuid,
        submitted: &HashSet<Uuid>,
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        FieldEngine::new(&mut store, kind)
            .validate_required(scope_id, submitted)
            .await?;
        Self::commit(tx).await
    }

    pub async fn apply_values(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        scope_id: Option<Uuid>,
        inputs: &[FieldValueInput],
    ) -> Result<Vec<FieldValue>> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .apply_values(owner_id, scope_id, inputs)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn project(
        &self,
        kind: OwnerKind,
        owner_id: Uuid,
        scope_id: Option<Uuid>,
    ) -> Result<Vec<ProjectedField>> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .project(owner_id, scope_id)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn read_values(&self, kind: OwnerKind, owner_id: Uuid) -> Result<Vec<ProjectedField>> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .read_values(owner_id)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }

    pub async fn clear_values(&self, kind: OwnerKind, owner_id: Uuid) -> Result<u64> {
        let mut tx = self.begin().await?;
        let mut store = PgFieldStore::new(&mut tx);
        let result = FieldEngine::new(&mut store, kind)
            .clear_values(owner_id)
            .await?;
        Self::commit(tx).await?;
        Ok(result)
    }
}
