//! [`FieldStore`] over a caller-owned PostgreSQL transaction.

use std::collections::HashSet;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, trace};
use uuid::Uuid;

use sylva_core::{
    Error, FieldDefinition, FieldStore, FieldValue, OwnerKind, Result, StoredValue, ValueKind,
};

use crate::bindings::{binding, TableBinding};

/// A field store bound to one open transaction.
///
/// The store never commits or rolls back; whoever began the transaction
/// decides. Dropping the transaction without committing discards every
/// write made through the store.
pub struct PgFieldStore<'t, 'c> {
    tx: &'t mut Transaction<'c, Postgres>,
}

impl<'t, 'c> PgFieldStore<'t, 'c> {
    pub fn new(tx: &'t mut Transaction<'c, Postgres>) -> Self {
        Self { tx }
    }
}

fn definition_select(b: &TableBinding) -> String {
    format!(
        "SELECT id, {scope} AS scope_id, name, value_kind, is_required, display_order,
                min_length, max_length, pattern, min_value, max_value, field_options,
                is_deleted, deleted_at, created_at, created_by
         FROM {table}",
        scope = b.scope_column,
        table = b.definition_table,
    )
}

fn definition_from_row(kind: OwnerKind, row: &PgRow) -> Result<FieldDefinition> {
    let raw_kind: String = row.get("value_kind");
    let value_kind = raw_kind.parse::<ValueKind>().map_err(Error::Internal)?;

    Ok(FieldDefinition {
        id: row.get("id"),
        owner_kind: kind,
        scope_id: row.get("scope_id"),
        name: row.get("name"),
        value_kind,
        is_required: row.get("is_required"),
        display_order: row.get("display_order"),
        min_length: row.get("min_length"),
        max_length: row.get("max_length"),
        pattern: row.get("pattern"),
        min_value: row.get("min_value"),
        max_value: row.get("max_value"),
        options: row.get("field_options"),
        is_deleted: row.get("is_deleted"),
        deleted_at: row.get("deleted_at"),
        created_at: row.get("created_at"),
        created_by: row.get("created_by"),
    })
}

fn value_from_row(row: &PgRow) -> Result<FieldValue> {
    let raw_kind: String = row.get("value_kind");
    let kind = raw_kind.parse::<ValueKind>().map_err(Error::Internal)?;
    let id: Uuid = row.get("id");
    let value = StoredValue::from_columns(
        kind,
        row.get::<Option<String>, _>("value_string"),
        row.get::<Option<BigDecimal>, _>("value_number"),
    )
    .ok_or_else(|| {
        Error::Internal(format!(
            "field value {} has no {} column set",
            id,
            if kind.is_textual() { "text" } else { "number" }
        ))
    })?;

    Ok(FieldValue {
        id,
        owner_id: row.get("owner_id"),
        field_id: row.get("field_id"),
        value,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Translate a unique-index violation on the active-name index into the
/// engine's conflict error. Anything else stays a database error.
fn map_definition_write(err: sqlx::Error, definition: &FieldDefinition) -> Error {
    let is_name_clash = err
        .as_database_error()
        .map(|db| {
            db.is_unique_violation()
                && db.constraint().is_some_and(|c| c.ends_with("_active_name"))
        })
        .unwrap_or(false);
    if is_name_clash {
        Error::SchemaConflict {
            scope_id: definition.scope_id,
            name: definition.name.clone(),
        }
    } else {
        Error::Database(err)
    }
}

#[async_trait]
impl<'t, 'c> FieldStore for PgFieldStore<'t, 'c> {
    async fn get_definition(
        &mut self,
        kind: OwnerKind,
        field_id: Uuid,
    ) -> Result<Option<FieldDefinition>> {
        let b = binding(kind);
        let sql = format!("{} WHERE id = $1", definition_select(&b));
        let row = sqlx::query(&sql)
            .bind(field_id)
            .fetch_optional(&mut **self.tx)
            .await
            .map_err(Error::Database)?;
        row.map(|r| definition_from_row(kind, &r)).transpose()
    }

    async fn list_definitions(
        &mut self,
        kind: OwnerKind,
        scope_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<FieldDefinition>> {
        let b = binding(kind);
        let sql = format!(
            "{} WHERE {} = $1 AND ($2 OR is_deleted = FALSE)
             ORDER BY display_order, name, id",
            definition_select(&b),
            b.scope_column
        );
        let rows = sqlx::query(&sql)
            .bind(scope_id)
            .bind(include_deleted)
            .fetch_all(&mut **self.tx)
            .await
            .map_err(Error::Database)?;

        trace!(
            subsystem = "db",
            component = "pg_store",
            op = "list_definitions",
            db_table = b.definition_table,
            result_count = rows.len(),
            "Loaded definitions"
        );
        rows.iter().map(|r| definition_from_row(kind, r)).collect()
    }

    async fn get_definitions_by_ids(
        &mut self,
        kind: OwnerKind,
        ids: &[Uuid],
    ) -> Result<Vec<FieldDefinition>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let b = binding(kind);
        let sql = format!("{} WHERE id = ANY($1)", definition_select(&b));
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&mut **self.tx)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(|r| definition_from_row(kind, r)).collect()
    }

    async fn insert_definition(&mut self, definition: &FieldDefinition) -> Result<()> {
        let b = binding(definition.owner_kind);
        let sql = format!(
            "INSERT INTO {table} (id, {scope}, name, value_kind, is_required, display_order,
                                  min_length, max_length, pattern, min_value, max_value,
                                  field_options, is_deleted, deleted_at, created_at, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            table = b.definition_table,
            scope = b.scope_column,
        );
        sqlx::query(&sql)
            .bind(definition.id)
            .bind(definition.scope_id)
            .bind(&definition.name)
            .bind(definition.value_kind.as_str())
            .bind(definition.is_required)
            .bind(definition.display_order)
            .bind(definition.min_length)
            .bind(definition.max_length)
            .bind(&definition.pattern)
            .bind(&definition.min_value)
            .bind(&definition.max_value)
            .bind(&definition.options)
            .bind(definition.is_deleted)
            .bind(definition.deleted_at)
            .bind(definition.created_at)
            .bind(definition.created_by)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| map_definition_write(e, definition))?;
        Ok(())
    }

    async fn update_definition(&mut self, definition: &FieldDefinition) -> Result<()> {
        let b = binding(definition.owner_kind);
        let sql = format!(
            "UPDATE {table}
             SET name = $2, value_kind = $3, is_required = $4, display_order = $5,
                 min_length = $6, max_length = $7, pattern = $8, min_value = $9,
                 max_value = $10, field_options = $11, is_deleted = $12, deleted_at = $13
             WHERE id = $1",
            table = b.definition_table,
        );
        let result = sqlx::query(&sql)
            .bind(definition.id)
            .bind(&definition.name)
            .bind(definition.value_kind.as_str())
            .bind(definition.is_required)
            .bind(definition.display_order)
            .bind(definition.min_length)
            .bind(definition.max_length)
            .bind(&definition.pattern)
            .bind(&definition.min_value)
            .bind(&definition.max_value)
            .bind(&definition.options)
            .bind(definition.is_deleted)
            .bind(definition.deleted_at)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| map_definition_write(e, definition))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Field {}", definition.id)));
        }
        Ok(())
    }

    async fn count_values_for_field(&mut self, kind: OwnerKind, field_id: Uuid) -> Result<i64> {
        let b = binding(kind);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE field_id = $1", b.value_table);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(field_id)
            .fetch_one(&mut **self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    async fn locked_field_ids(
        &mut self,
        kind: OwnerKind,
        field_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>> {
        if field_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let b = binding(kind);
        let sql = format!(
            "SELECT DISTINCT field_id FROM {} WHERE field_id = ANY($1)",
            b.value_table
        );
        let ids: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(field_ids)
            .fetch_all(&mut **self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(ids.into_iter().collect())
    }

    async fn list_values(&mut self, kind: OwnerKind, owner_id: Uuid) -> Result<Vec<FieldValue>> {
        let b = binding(kind);
        let sql = format!(
            "SELECT v.id, v.{owner} AS owner_id, v.field_id, v.value_string, v.value_number,
                    v.created_at, v.updated_at, d.value_kind
             FROM {values} v
             JOIN {definitions} d ON d.id = v.field_id
             WHERE v.{owner} = $1
             ORDER BY v.created_at, v.id",
            owner = b.owner_column,
            values = b.value_table,
            definitions = b.definition_table,
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&mut **self.tx)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(value_from_row).collect()
    }

    async fn replace_values(
        &mut self,
        kind: OwnerKind,
        owner_id: Uuid,
        values: &[FieldValue],
    ) -> Result<()> {
        let b = binding(kind);
        let keep: Vec<Uuid> = values.iter().map(|v| v.field_id).collect();

        let delete_sql = format!(
            "DELETE FROM {} WHERE {} = $1 AND NOT (field_id = ANY($2))",
            b.value_table, b.owner_column
        );
        let removed = sqlx::query(&delete_sql)
            .bind(owner_id)
            .bind(&keep)
            .execute(&mut **self.tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        let upsert_sql = format!(
            "INSERT INTO {table} (id, {owner}, field_id, value_string, value_number, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT ({owner}, field_id) DO UPDATE
             SET value_string = EXCLUDED.value_string,
                 value_number = EXCLUDED.value_number,
                 updated_at = EXCLUDED.updated_at",
            table = b.value_table,
            owner = b.owner_column,
        );
        for value in values {
            let (value_string, value_number) = value.value.clone().into_columns();
            sqlx::query(&upsert_sql)
                .bind(value.id)
                .bind(owner_id)
                .bind(value.field_id)
                .bind(value_string)
                .bind(value_number)
                .bind(value.created_at)
                .bind(value.updated_at)
                .execute(&mut **self.tx)
                .await
                .map_err(Error::Database)?;
        }

        debug!(
            subsystem = "db",
            component = "pg_store",
            op = "replace_values",
            db_table = b.value_table,
            owner_id = %owner_id,
            result_count = values.len(),
            removed,
            "Replaced owner values"
        );
        Ok(())
    }

    async fn delete_values(&mut self, kind: OwnerKind, owner_id: Uuid) -> Result<u64> {
        let b = binding(kind);
        let sql = format!("DELETE FROM {} WHERE {} = $1", b.value_table, b.owner_column);
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .execute(&mut **self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
