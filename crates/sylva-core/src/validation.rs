//! Validation of candidate values and of definition attributes.
//!
//! Everything here is pure: no store access, no side effects beyond logging.

use std::collections::HashSet;

use regex::Regex;
use tracing::error;
use uuid::Uuid;

use crate::defaults::FIELD_NAME_MAX_LEN;
use crate::error::{Error, Result};
use crate::models::{CandidateValue, FieldDefinition, OwnerKind, StoredValue, ValueKind};

/// Compile a field pattern with match-from-start semantics.
///
/// The pattern is anchored at the beginning of the value only; trailing
/// text after a match is accepted.
pub fn compile_pattern(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(r"\A(?:{})", pattern))
}

/// Check a candidate value against a definition and return the typed value
/// to store.
pub fn validate_value(field: &FieldDefinition, candidate: &CandidateValue) -> Result<StoredValue> {
    match field.value_kind {
        ValueKind::String => {
            let text = expect_text(field, candidate)?;
            check_length(field, text)?;
            check_pattern(field, text)?;
            Ok(StoredValue::String(text.to_string()))
        }
        ValueKind::Number => {
            let number = match candidate {
                CandidateValue::Number(n) => n,
                CandidateValue::Text(_) => {
                    return Err(Error::ValueType {
                        field: field.name.clone(),
                        expected: "number",
                    })
                }
            };
            if let Some(min) = &field.min_value {
                if number < min {
                    return Err(violation(field, format!("must be at least {}", min)));
                }
            }
            if let Some(max) = &field.max_value {
                if number > max {
                    return Err(violation(field, format!("must be at most {}", max)));
                }
            }
            Ok(StoredValue::Number(number.clone()))
        }
        ValueKind::Select => {
            let text = expect_text(field, candidate)?;
            if !field.options.iter().any(|o| o == text) {
                return Err(violation(
                    field,
                    format!("must be one of: {}", field.options.join(", ")),
                ));
            }
            Ok(StoredValue::String(text.to_string()))
        }
    }
}

fn expect_text<'a>(field: &FieldDefinition, candidate: &'a CandidateValue) -> Result<&'a str> {
    match candidate {
        CandidateValue::Text(s) => Ok(s),
        CandidateValue::Number(_) => Err(Error::ValueType {
            field: field.name.clone(),
            expected: "string",
        }),
    }
}

fn check_length(field: &FieldDefinition, text: &str) -> Result<()> {
    let len = text.chars().count() as i64;
    if let Some(min) = field.min_length {
        if len < i64::from(min) {
            return Err(violation(
                field,
                format!("must be at least {} characters", min),
            ));
        }
    }
    if let Some(max) = field.max_length {
        if len > i64::from(max) {
            return Err(violation(field, format!("must be at most {} characters", max)));
        }
    }
    Ok(())
}

fn check_pattern(field: &FieldDefinition, text: &str) -> Result<()> {
    let Some(pattern) = field.pattern.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let re = compile_pattern(pattern).map_err(|e| {
        error!(
            subsystem = "fields",
            component = "validator",
            field_id = %field.id,
            error = %e,
            "Stored validation pattern does not compile"
        );
        Error::InvalidPattern {
            field_id: field.id,
            message: e.to_string(),
        }
    })?;
    if !re.is_match(text) {
        return Err(violation(field, "does not match required pattern".to_string()));
    }
    Ok(())
}

fn violation(field: &FieldDefinition, message: String) -> Error {
    Error::ConstraintViolation {
        field: field.name.clone(),
        message,
    }
}

/// Fail when any active required definition is absent from `submitted`.
///
/// The error names every missing field, in the order of `definitions`.
pub fn validate_required(definitions: &[FieldDefinition], submitted: &HashSet<Uuid>) -> Result<()> {
    let missing: Vec<String> = definitions
        .iter()
        .filter(|d| d.is_active() && d.is_required && !submitted.contains(&d.id))
        .map(|d| d.name.clone())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingRequiredFields(missing))
    }
}

/// Check that a definition's own attributes are coherent.
///
/// Runs on create, update and sync. Never looks at stored values, so
/// tightening a bound on a field that already has values is accepted.
/// Constraint groups belonging to another kind are not checked.
pub fn validate_definition(field: &FieldDefinition) -> Result<()> {
    let name = field.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidDefinition("field name cannot be empty".into()));
    }
    if field.name.chars().count() > FIELD_NAME_MAX_LEN {
        return Err(Error::InvalidDefinition(format!(
            "field name must be {} characters or less",
            FIELD_NAME_MAX_LEN
        )));
    }

    if field.value_kind == ValueKind::Select && !field.owner_kind.supports_select() {
        return Err(Error::InvalidDefinition(format!(
            "select fields are not available for {} fields",
            field.owner_kind
        )));
    }

    match field.value_kind {
        ValueKind::String => validate_string_constraints(field)?,
        ValueKind::Number => validate_number_constraints(field)?,
        ValueKind::Select => {}
    }

    if field.value_kind == ValueKind::Select {
        if field.options.is_empty() {
            return Err(Error::InvalidDefinition(
                "select fields need at least one option".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = field.options.iter().find(|o| !seen.insert(o.as_str())) {
            return Err(Error::InvalidDefinition(format!("duplicate option '{}'", dup)));
        }
    }

    Ok(())
}

fn validate_string_constraints(field: &FieldDefinition) -> Result<()> {
    for (label, bound) in [("min_length", field.min_length), ("max_length", field.max_length)] {
        if matches!(bound, Some(n) if n < 0) {
            return Err(Error::InvalidDefinition(format!("{} must be non-negative", label)));
        }
    }
    if let (Some(min), Some(max)) = (field.min_length, field.max_length) {
        if max < min {
            return Err(Error::InvalidDefinition(
                "max_length must be greater than or equal to min_length".into(),
            ));
        }
    }
    if let Some(pattern) = field.pattern.as_deref() {
        compile_pattern(pattern)
            .map_err(|e| Error::InvalidDefinition(format!("invalid pattern: {}", e)))?;
    }
    Ok(())
}

fn validate_number_constraints(field: &FieldDefinition) -> Result<()> {
    if let (Some(min), Some(max)) = (&field.min_value, &field.max_value) {
        if max < min {
            return Err(Error::InvalidDefinition(
                "max_value must be greater than or equal to min_value".into(),
            ));
        }
    }
    Ok(())
}

/// Guard against the same owner kind being mixed into one operation.
pub(crate) fn ensure_owner_kind(field: &FieldDefinition, kind: OwnerKind) -> Result<()> {
    if field.owner_kind != kind {
        return Err(Error::Internal(format!(
            "definition {} belongs to {} fields, not {}",
            field.id, field.owner_kind, kind
        )));
    }
    Ok(())
}
