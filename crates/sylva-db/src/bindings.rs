//! Table and column names for each owner kind.

use sylva_core::OwnerKind;

/// Where one owner kind keeps its definitions and values.
///
/// All names are compile-time constants; they are spliced into SQL text and
/// never come from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableBinding {
    pub definition_table: &'static str,
    pub scope_column: &'static str,
    pub value_table: &'static str,
    pub owner_column: &'static str,
}

const ACCESSION: TableBinding = TableBinding {
    definition_table: "project_accession_field",
    scope_column: "project_id",
    value_table: "accession_field_value",
    owner_column: "accession_id",
};

const PLANT: TableBinding = TableBinding {
    definition_table: "project_plant_field",
    scope_column: "project_id",
    value_table: "plant_field_value",
    owner_column: "plant_id",
};

const LOCATION: TableBinding = TableBinding {
    definition_table: "location_type_field",
    scope_column: "location_type_id",
    value_table: "location_field_value",
    owner_column: "location_id",
};

const EVENT: TableBinding = TableBinding {
    definition_table: "event_type_field",
    scope_column: "event_type_id",
    value_table: "event_field_value",
    owner_column: "event_id",
};

pub fn binding(kind: OwnerKind) -> TableBinding {
    match kind {
        OwnerKind::Accession => ACCESSION,
        OwnerKind::Plant => PLANT,
        OwnerKind::Location => LOCATION,
        OwnerKind::Event => EVENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_kind_has_distinct_tables() {
        let definitions: HashSet<_> = OwnerKind::ALL
            .iter()
            .map(|k| binding(*k).definition_table)
            .collect();
        let values: HashSet<_> = OwnerKind::ALL
            .iter()
            .map(|k| binding(*k).value_table)
            .collect();
        assert_eq!(definitions.len(), 4);
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn test_project_scoped_kinds_share_scope_column() {
        assert_eq!(binding(OwnerKind::Accession).scope_column, "project_id");
        assert_eq!(binding(OwnerKind::Plant).scope_column, "project_id");
        assert_eq!(binding(OwnerKind::Location).scope_column, "location_type_id");
        assert_eq!(binding(OwnerKind::Event).owner_column, "event_id");
    }
}
