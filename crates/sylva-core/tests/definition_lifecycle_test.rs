//! Definition CRUD through the field engine: name uniqueness, lock
//! enforcement on kind changes, soft-delete, batch creation and scope sync.

use bigdecimal::BigDecimal;
use sylva_core::{
    CreateFieldDefinitionRequest, Error, FieldEngine, FieldValueInput, MemoryFieldStore,
    OwnerKind, SyncFieldDefinition, UpdateFieldDefinitionRequest, ValueKind,
};
use uuid::Uuid;

fn string_field(name: &str) -> CreateFieldDefinitionRequest {
    CreateFieldDefinitionRequest::new(name, ValueKind::String)
}

fn number_field(name: &str) -> CreateFieldDefinitionRequest {
    CreateFieldDefinitionRequest::new(name, ValueKind::Number)
}

#[tokio::test]
async fn test_duplicate_active_name_is_a_schema_conflict() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Accession);
    let scope = Uuid::new_v4();
    let admin = Uuid::new_v4();

    engine
        .create_definition(scope, string_field("Notes"), admin)
        .await
        .expect("first create");

    let err = engine
        .create_definition(scope, number_field("Notes"), admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaConflict { ref name, .. } if name == "Notes"));

    // Case-sensitive: a different spelling is a different field
    engine
        .create_definition(scope, string_field("notes"), admin)
        .await
        .expect("different case is allowed");
}

#[tokio::test]
async fn test_same_name_in_other_scope_is_allowed() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Plant);
    let admin = Uuid::new_v4();

    engine
        .create_definition(Uuid::new_v4(), string_field("Notes"), admin)
        .await
        .unwrap();
    engine
        .create_definition(Uuid::new_v4(), string_field("Notes"), admin)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_deleted_name_can_be_reused_but_not_twice() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Plant);
    let scope = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let old = engine
        .create_definition(scope, string_field("Colour"), admin)
        .await
        .unwrap();
    engine.soft_delete_definition(old.id).await.unwrap();

    engine
        .create_definition(scope, string_field("Colour"), admin)
        .await
        .expect("name of a deleted field is free again");

    let err = engine
        .create_definition(scope, string_field("Colour"), admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaConflict { .. }));
}

#[tokio::test]
async fn test_rename_collision_excludes_self() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Event);
    let scope = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let a = engine.create_definition(scope, string_field("A"), admin).await.unwrap();
    engine.create_definition(scope, string_field("B"), admin).await.unwrap();

    // Renaming to its own name is not a clash
    let same = engine
        .update_definition(
            a.id,
            UpdateFieldDefinitionRequest {
                name: Some("A".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(same.name, "A");

    let err = engine
        .update_definition(
            a.id,
            UpdateFieldDefinitionRequest {
                name: Some("B".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaConflict { .. }));
}

#[tokio::test]
async fn test_locked_field_rejects_kind_change_but_allows_other_edits() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Accession);
    let scope = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let owner = Uuid::new_v4();

    let field = engine
        .create_definition(scope, string_field("Collector"), admin)
        .await
        .unwrap();
    assert!(!engine.is_locked(field.id).await.unwrap());

    // Unlocked: kind may change freely
    engine
        .update_definition(
            field.id,
            UpdateFieldDefinitionRequest {
                value_kind: Some(ValueKind::Number),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    engine
        .update_definition(
            field.id,
            UpdateFieldDefinitionRequest {
                value_kind: Some(ValueKind::String),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    engine
        .apply_values(owner, Some(scope), &[FieldValueInput::new(field.id, "J. Smith")])
        .await
        .unwrap();
    assert!(engine.is_locked(field.id).await.unwrap());

    let err = engine
        .update_definition(
            field.id,
            UpdateFieldDefinitionRequest {
                value_kind: Some(ValueKind::Number),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockedTypeChange { field_id, .. } if field_id == field.id));
    assert_eq!(err.status_code(), 409);

    let renamed = engine
        .update_definition(
            field.id,
            UpdateFieldDefinitionRequest {
                name: Some("Collected by".into()),
                is_required: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("name and required flag stay editable");
    assert_eq!(renamed.name, "Collected by");
    assert!(renamed.is_required);
    assert_eq!(renamed.value_kind, ValueKind::String);

    // Resending the current kind is not a change
    engine
        .update_definition(
            field.id,
            UpdateFieldDefinitionRequest {
                value_kind: Some(ValueKind::String),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tightening_bounds_keeps_existing_values() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Plant);
    let scope = Uuid::new_v4();
    let owner = Uuid::new_v4();

    let field = engine
        .create_definition(scope, string_field("Label"), Uuid::new_v4())
        .await
        .unwrap();
    engine
        .apply_values(owner, Some(scope), &[FieldValueInput::new(field.id, "a long label")])
        .await
        .unwrap();

    engine
        .update_definition(
            field.id,
            UpdateFieldDefinitionRequest {
                max_length: Some(Some(3)),
                ..Default::default()
            },
        )
        .await
        .expect("bounds may be tightened on a locked field");

    let rows = engine.project(owner, Some(scope)).await.unwrap();
    assert_eq!(rows[0].value.as_ref().and_then(|v| v.as_str()), Some("a long label"));
}

#[tokio::test]
async fn test_partial_update_leaves_omitted_attributes() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Accession);
    let scope = Uuid::new_v4();

    let mut request = number_field("Height");
    request.min_value = Some(BigDecimal::from(0));
    request.max_value = Some(BigDecimal::from(500));
    request.display_order = 3;
    let field = engine
        .create_definition(scope, request, Uuid::new_v4())
        .await
        .unwrap();

    let updated = engine
        .update_definition(
            field.id,
            UpdateFieldDefinitionRequest {
                max_value: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.min_value, Some(BigDecimal::from(0)));
    assert_eq!(updated.max_value, None);
    assert_eq!(updated.display_order, 3);
    assert_eq!(updated.name, "Height");
}

#[tokio::test]
async fn test_incoherent_definitions_are_rejected() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Accession);
    let scope = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let mut bad_bounds = string_field("Code");
    bad_bounds.min_length = Some(5);
    bad_bounds.max_length = Some(2);
    let err = engine.create_definition(scope, bad_bounds, admin).await.unwrap_err();
    assert!(matches!(err, Error::InvalidDefinition(_)));

    let mut bad_pattern = string_field("Code");
    bad_pattern.pattern = Some("(".into());
    let err = engine.create_definition(scope, bad_pattern, admin).await.unwrap_err();
    assert!(matches!(err, Error::InvalidDefinition(_)));

    let mut select = CreateFieldDefinitionRequest::new("Bed", ValueKind::Select);
    select.options = vec!["North".into()];
    let err = engine.create_definition(scope, select, admin).await.unwrap_err();
    assert!(matches!(err, Error::InvalidDefinition(_)));

    assert!(engine.list_definitions(scope, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_select_fields_are_available_for_locations() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Location);
    let location_type = Uuid::new_v4();

    let mut select = CreateFieldDefinitionRequest::new("Exposure", ValueKind::Select);
    select.options = vec!["Sun".into(), "Shade".into()];
    let field = engine
        .create_definition(location_type, select, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(field.options, vec!["Sun", "Shade"]);
}

#[tokio::test]
async fn test_soft_delete_is_idempotent_and_keeps_values() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Plant);
    let scope = Uuid::new_v4();
    let owner = Uuid::new_v4();

    let field = engine
        .create_definition(scope, string_field("Tag"), Uuid::new_v4())
        .await
        .unwrap();
    engine
        .apply_values(owner, Some(scope), &[FieldValueInput::new(field.id, "T-1")])
        .await
        .unwrap();

    let deleted = engine.soft_delete_definition(field.id).await.unwrap();
    assert!(deleted.is_deleted);
    let deleted_at = deleted.deleted_at.expect("deletion time set");

    let again = engine.soft_delete_definition(field.id).await.unwrap();
    assert_eq!(again.deleted_at, Some(deleted_at));

    // Still locked: the value survives the soft delete
    let view = engine.get_definition(field.id).await.unwrap();
    assert!(view.is_locked);
    assert!(view.definition.is_deleted);
}

#[tokio::test]
async fn test_list_definitions_orders_and_reports_locks() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Accession);
    let scope = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let owner = Uuid::new_v4();

    let mut late = string_field("Zeta");
    late.display_order = 2;
    let mut early = string_field("Beta");
    early.display_order = 1;
    let alpha = string_field("Alpha");
    let mut alpha_late = alpha.clone();
    alpha_late.name = "Alpha2".into();
    alpha_late.display_order = 2;

    let created = engine
        .create_definitions(scope, vec![late, early, alpha, alpha_late], admin)
        .await
        .unwrap();
    let gone = created
        .iter()
        .find(|d| d.name == "Beta")
        .map(|d| d.id)
        .unwrap();
    let zeta = created.iter().find(|d| d.name == "Zeta").unwrap().id;

    engine
        .apply_values(owner, Some(scope), &[FieldValueInput::new(zeta, "z")])
        .await
        .unwrap();
    engine.soft_delete_definition(gone).await.unwrap();

    let active: Vec<_> = engine
        .list_definitions(scope, false)
        .await
        .unwrap()
        .into_iter()
        .map(|v| (v.definition.name, v.is_locked))
        .collect();
    assert_eq!(
        active,
        vec![
            ("Alpha".to_string(), false),
            ("Alpha2".to_string(), false),
            ("Zeta".to_string(), true),
        ]
    );

    let all = engine.list_definitions(scope, true).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().any(|v| v.definition.id == gone && v.definition.is_deleted));
}

#[tokio::test]
async fn test_batch_create_is_all_or_nothing() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Event);
    let event_type = Uuid::new_v4();

    let err = engine
        .create_definitions(
            event_type,
            vec![string_field("Notes"), number_field("Count"), string_field("Notes")],
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaConflict { .. }));
    assert!(engine.list_definitions(event_type, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_definition_in_scope_rejects_other_scope() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Plant);
    let scope = Uuid::new_v4();

    let field = engine
        .create_definition(scope, string_field("Notes"), Uuid::new_v4())
        .await
        .unwrap();

    assert!(engine.get_definition_in_scope(scope, field.id).await.is_ok());
    let err = engine
        .get_definition_in_scope(Uuid::new_v4(), field.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = engine.get_definition(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_definitions_are_isolated_by_owner_kind() {
    let mut store = MemoryFieldStore::new();
    let scope = Uuid::new_v4();

    let accession_field = FieldEngine::new(&mut store, OwnerKind::Accession)
        .create_definition(scope, string_field("Notes"), Uuid::new_v4())
        .await
        .unwrap();

    let mut plants = FieldEngine::new(&mut store, OwnerKind::Plant);
    assert!(plants.active_definitions(scope).await.unwrap().is_empty());
    assert!(matches!(
        plants.get_definition(accession_field.id).await.unwrap_err(),
        Error::NotFound(_)
    ));
}

#[tokio::test]
async fn test_sync_updates_creates_and_soft_deletes() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Location);
    let location_type = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let created = engine
        .create_definitions(
            location_type,
            vec![string_field("Bed"), number_field("Row"), string_field("Soil")],
            admin,
        )
        .await
        .unwrap();
    let bed = created[0].clone();
    let row = created[1].clone();
    let soil = created[2].clone();

    let mut row_update = number_field("Row number");
    row_update.min_value = Some(BigDecimal::from(1));
    let desired = vec![
        SyncFieldDefinition {
            id: Some(bed.id),
            field: string_field("Bed"),
        },
        SyncFieldDefinition {
            id: Some(row.id),
            field: row_update,
        },
        SyncFieldDefinition {
            id: None,
            field: string_field("Soil"),
        },
    ];

    let active = engine
        .sync_definitions(location_type, desired, admin)
        .await
        .expect("sync succeeds");

    let names: Vec<_> = active.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Bed", "Row number", "Soil"]);

    let renamed = active.iter().find(|d| d.id == row.id).unwrap();
    assert_eq!(renamed.min_value, Some(BigDecimal::from(1)));
    assert_eq!(renamed.created_at, row.created_at);

    // "Soil" was dropped and recreated under a new id
    let new_soil = active.iter().find(|d| d.name == "Soil").unwrap();
    assert_ne!(new_soil.id, soil.id);
    let old_soil = engine.get_definition(soil.id).await.unwrap();
    assert!(old_soil.definition.is_deleted);
}

fn keep(id: Uuid, field: CreateFieldDefinitionRequest) -> SyncFieldDefinition {
    SyncFieldDefinition { id: Some(id), field }
}

#[tokio::test]
async fn test_sync_renames_along_a_chain() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Location);
    let location_type = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let created = engine
        .create_definitions(location_type, vec![string_field("Row"), string_field("Bed")], admin)
        .await
        .unwrap();
    let (row, bed) = (created[0].id, created[1].id);

    let active = engine
        .sync_definitions(
            location_type,
            vec![keep(row, string_field("Bed")), keep(bed, string_field("Plot"))],
            admin,
        )
        .await
        .expect("chain of renames");

    let named: Vec<_> = active.iter().map(|d| (d.name.as_str(), d.id)).collect();
    assert_eq!(named, vec![("Bed", row), ("Plot", bed)]);
    assert!(active.iter().all(|d| !d.is_deleted));
    assert_eq!(engine.list_definitions(location_type, true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sync_swaps_names() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Plant);
    let project = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let created = engine
        .create_definitions(project, vec![string_field("Height"), number_field("Width")], admin)
        .await
        .unwrap();
    let (height, width) = (created[0].id, created[1].id);

    let active = engine
        .sync_definitions(
            project,
            vec![keep(height, string_field("Width")), keep(width, number_field("Height"))],
            admin,
        )
        .await
        .expect("swap of names");

    let by_name: Vec<_> = active.iter().map(|d| (d.name.as_str(), d.id, d.value_kind)).collect();
    assert_eq!(
        by_name,
        vec![
            ("Height", width, ValueKind::Number),
            ("Width", height, ValueKind::String),
        ]
    );
    assert!(engine.get_definition(height).await.unwrap().definition.is_active());
    assert!(engine.get_definition(width).await.unwrap().definition.is_active());
}

#[tokio::test]
async fn test_sync_rename_takes_name_of_dropped_field() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Event);
    let event_type = Uuid::new_v4();
    let admin = Uuid::new_v4();

    let created = engine
        .create_definitions(event_type, vec![string_field("Notes"), string_field("Remarks")], admin)
        .await
        .unwrap();
    let (notes, remarks) = (created[0].id, created[1].id);

    let active = engine
        .sync_definitions(event_type, vec![keep(remarks, string_field("Notes"))], admin)
        .await
        .unwrap();

    assert_eq!(active.len(), 1);
    assert_eq!((active[0].id, active[0].name.as_str()), (remarks, "Notes"));
    let dropped = engine.get_definition(notes).await.unwrap();
    assert!(dropped.definition.is_deleted);
    assert_eq!(dropped.definition.name, "Notes");
}

#[tokio::test]
async fn test_sync_rejects_duplicate_names_and_locked_kind_change() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Event);
    let event_type = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let event = Uuid::new_v4();

    let field = engine
        .create_definition(event_type, string_field("Observer"), admin)
        .await
        .unwrap();

    let err = engine
        .sync_definitions(
            event_type,
            vec![
                SyncFieldDefinition {
                    id: Some(field.id),
                    field: string_field("Observer"),
                },
                SyncFieldDefinition {
                    id: None,
                    field: string_field("Observer"),
                },
            ],
            admin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaConflict { .. }));

    engine
        .apply_values(event, Some(event_type), &[FieldValueInput::new(field.id, "R. Ng")])
        .await
        .unwrap();

    let err = engine
        .sync_definitions(
            event_type,
            vec![SyncFieldDefinition {
                id: Some(field.id),
                field: number_field("Observer"),
            }],
            admin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockedTypeChange { .. }));

    // Nothing was written by the failed syncs
    let listed = engine.list_definitions(event_type, true).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].definition.value_kind, ValueKind::String);
}

#[tokio::test]
async fn test_soft_delete_scope_removes_all_active_fields() {
    let mut store = MemoryFieldStore::new();
    let mut engine = FieldEngine::new(&mut store, OwnerKind::Event);
    let event_type = Uuid::new_v4();
    let admin = Uuid::new_v4();

    engine
        .create_definitions(
            event_type,
            vec![string_field("Observer"), number_field("Count")],
            admin,
        )
        .await
        .unwrap();

    assert_eq!(engine.soft_delete_scope(event_type).await.unwrap(), 2);
    assert!(engine.active_definitions(event_type).await.unwrap().is_empty());
    assert_eq!(engine.list_definitions(event_type, true).await.unwrap().len(), 2);
    assert_eq!(engine.soft_delete_scope(event_type).await.unwrap(), 0);
}
