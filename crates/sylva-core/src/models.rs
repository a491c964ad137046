//! Core data models for custom fields.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// =============================================================================
// OWNER AND SCOPE KINDS
// =============================================================================

/// The kind of record a custom field value is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Accession,
    Plant,
    Location,
    Event,
}

impl OwnerKind {
    pub const ALL: [OwnerKind; 4] = [
        OwnerKind::Accession,
        OwnerKind::Plant,
        OwnerKind::Location,
        OwnerKind::Event,
    ];

    /// The container that defines which fields exist for this owner kind.
    pub fn scope_kind(self) -> ScopeKind {
        match self {
            Self::Accession | Self::Plant => ScopeKind::Project,
            Self::Location => ScopeKind::LocationType,
            Self::Event => ScopeKind::EventType,
        }
    }

    /// Whether definitions for this owner kind may use [`ValueKind::Select`].
    pub fn supports_select(self) -> bool {
        matches!(self, Self::Location)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accession => "accession",
            Self::Plant => "plant",
            Self::Location => "location",
            Self::Event => "event",
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accession" => Ok(Self::Accession),
            "plant" => Ok(Self::Plant),
            "location" => Ok(Self::Location),
            "event" => Ok(Self::Event),
            _ => Err(format!("Invalid owner kind: {}", s)),
        }
    }
}

/// The container kind a field definition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Project,
    LocationType,
    EventType,
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::LocationType => write!(f, "location type"),
            Self::EventType => write!(f, "event type"),
        }
    }
}

// =============================================================================
// VALUE KINDS AND VALUES
// =============================================================================

/// Declared type of a custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    /// Text drawn from a closed list of options
    Select,
}

impl ValueKind {
    /// Kinds whose values live in the text column.
    pub fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::Select)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Select => "select",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "select" => Ok(Self::Select),
            _ => Err(format!("Invalid value kind: {}", s)),
        }
    }
}

/// JSON encoding of exact decimals.
///
/// serde_json carries numbers as `i64`, `u64` or `f64`, so decimals are read
/// from the number's text and written as a number only when that number
/// reads back to the same decimal.
mod decimal_json {
    use std::str::FromStr;

    use bigdecimal::{BigDecimal, ToPrimitive};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn from_number(n: &serde_json::Number) -> Result<BigDecimal, String> {
        BigDecimal::from_str(&n.to_string()).map_err(|e| format!("Invalid number {}: {}", n, e))
    }

    /// The JSON number that parses back to exactly `n`, if there is one.
    pub fn exact_number(n: &BigDecimal) -> Option<serde_json::Number> {
        if n.is_integer() {
            if let Some(i) = n.to_i64() {
                return Some(i.into());
            }
        }
        let number = serde_json::Number::from_f64(n.to_f64()?)?;
        let back = BigDecimal::from_str(&number.to_string()).ok()?;
        (back == *n).then_some(number)
    }

    /// Always emits a JSON number, the nearest `f64` when no exact form exists.
    pub fn serialize<S: Serializer>(n: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(number) = exact_number(n) {
            return number.serialize(serializer);
        }
        match n.to_f64() {
            Some(f) if f.is_finite() => serializer.serialize_f64(f),
            _ => serializer.serialize_str(&n.to_string()),
        }
    }

    /// Bounds keep full precision: a decimal with no exact JSON number is
    /// written as a string, which [`deserialize_option`] accepts.
    pub fn serialize_option<S: Serializer>(
        value: &Option<BigDecimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            None => serializer.serialize_none(),
            Some(n) => match exact_number(n) {
                Some(number) => number.serialize(serializer),
                None => serializer.serialize_str(&n.to_string()),
            },
        }
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigDecimal>, D::Error> {
        let parsed = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Number(n) => from_number(&n).map(Some),
            serde_json::Value::String(s) => BigDecimal::from_str(s.trim())
                .map(Some)
                .map_err(|e| format!("Invalid decimal {:?}: {}", s, e)),
            other => Err(format!("Expected a number, got {}", other)),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

/// A value submitted by a caller, before validation.
///
/// Deserializes from a JSON string or number. Numbers are converted to exact
/// decimals from their textual JSON form, so `0.1` stays `0.1`.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateValue {
    Text(String),
    Number(BigDecimal),
}

impl CandidateValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Number(_) => "number",
        }
    }
}

impl TryFrom<serde_json::Value> for CandidateValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(Self::Text(s)),
            serde_json::Value::Number(n) => decimal_json::from_number(&n).map(Self::Number),
            other => Err(format!("Expected a string or number, got {}", other)),
        }
    }
}

impl Serialize for CandidateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => decimal_json::serialize(n, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CandidateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for CandidateValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CandidateValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for CandidateValue {
    fn from(n: i64) -> Self {
        Self::Number(BigDecimal::from(n))
    }
}

impl From<BigDecimal> for CandidateValue {
    fn from(n: BigDecimal) -> Self {
        Self::Number(n)
    }
}

/// A validated value as held by the domain layer.
///
/// Storage keeps two nullable columns; conversion happens only at that
/// boundary through [`StoredValue::from_columns`] and
/// [`StoredValue::into_columns`]. In JSON a string stays a string and a
/// number is written as a JSON number, so reading it back keeps the kind.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    String(String),
    Number(BigDecimal),
}

impl StoredValue {
    /// Rebuild a value from its storage columns, picking the column the
    /// field's kind selects. Returns `None` when that column is empty.
    pub fn from_columns(
        kind: ValueKind,
        value_string: Option<String>,
        value_number: Option<BigDecimal>,
    ) -> Option<Self> {
        if kind.is_textual() {
            value_string.map(Self::String)
        } else {
            value_number.map(Self::Number)
        }
    }

    /// Split into `(value_string, value_number)` with exactly one populated.
    pub fn into_columns(self) -> (Option<String>, Option<BigDecimal>) {
        match self {
            Self::String(s) => (Some(s), None),
            Self::Number(n) => (None, Some(n)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<&BigDecimal> {
        match self {
            Self::Number(n) => Some(n),
            Self::String(_) => None,
        }
    }
}

impl Serialize for StoredValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Number(n) => decimal_json::serialize(n, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StoredValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(Self::String(s)),
            serde_json::Value::Number(n) => decimal_json::from_number(&n)
                .map(Self::Number)
                .map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!(
                "Expected a string or number, got {}",
                other
            ))),
        }
    }
}

// =============================================================================
// FIELD DEFINITIONS
// =============================================================================

/// One custom attribute declared for an owner kind within a scope.
///
/// Only the constraint group selected by `value_kind` is consulted: length
/// bounds and `pattern` for strings, numeric bounds for numbers, and
/// `options` for selects. The other groups may hold stale values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: Uuid,
    pub owner_kind: OwnerKind,
    pub scope_id: Uuid,
    pub name: String,
    pub value_kind: ValueKind,
    pub is_required: bool,
    pub display_order: i32,

    // String constraints
    pub min_length: Option<i32>,
    pub max_length: Option<i32>,
    pub pattern: Option<String>,

    // Number constraints
    #[serde(
        default,
        serialize_with = "decimal_json::serialize_option",
        deserialize_with = "decimal_json::deserialize_option"
    )]
    pub min_value: Option<BigDecimal>,
    #[serde(
        default,
        serialize_with = "decimal_json::serialize_option",
        deserialize_with = "decimal_json::deserialize_option"
    )]
    pub max_value: Option<BigDecimal>,

    // Select vocabulary
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl FieldDefinition {
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// A definition annotated with its lock state, as listed to administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinitionView {
    #[serde(flatten)]
    pub definition: FieldDefinition,
    /// True once any value references the field; its kind is then frozen.
    pub is_locked: bool,
}

/// Request for creating a field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFieldDefinitionRequest {
    pub name: String,
    pub value_kind: ValueKind,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub min_length: Option<i32>,
    #[serde(default)]
    pub max_length: Option<i32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(
        default,
        serialize_with = "decimal_json::serialize_option",
        deserialize_with = "decimal_json::deserialize_option"
    )]
    pub min_value: Option<BigDecimal>,
    #[serde(
        default,
        serialize_with = "decimal_json::serialize_option",
        deserialize_with = "decimal_json::deserialize_option"
    )]
    pub max_value: Option<BigDecimal>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl CreateFieldDefinitionRequest {
    /// A bare request with no constraints, not required, display order 0.
    pub fn new(name: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            value_kind,
            is_required: false,
            display_order: crate::defaults::DISPLAY_ORDER,
            min_length: None,
            max_length: None,
            pattern: None,
            min_value: None,
            max_value: None,
            options: Vec::new(),
        }
    }
}

/// Partial update of a field definition.
///
/// `None` leaves an attribute untouched. For nullable constraints,
/// `Some(None)` clears the bound.
#[derive(Debug, Clone, Default)]
pub struct UpdateFieldDefinitionRequest {
    pub name: Option<String>,
    pub value_kind: Option<ValueKind>,
    pub is_required: Option<bool>,
    pub display_order: Option<i32>,
    pub min_length: Option<Option<i32>>,
    pub max_length: Option<Option<i32>>,
    pub pattern: Option<Option<String>>,
    pub min_value: Option<Option<BigDecimal>>,
    pub max_value: Option<Option<BigDecimal>>,
    pub options: Option<Vec<String>>,
}

/// One entry of a desired field list when replacing a scope's fields.
///
/// Entries with the id of an existing definition in the scope update it;
/// entries without one create a new definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFieldDefinition {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub field: CreateFieldDefinitionRequest,
}

// =============================================================================
// FIELD VALUES
// =============================================================================

/// The realized value of one definition for one owner record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub field_id: Uuid,
    pub value: StoredValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A value submitted for an owner record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValueInput {
    pub field_id: Uuid,
    pub value: CandidateValue,
}

impl FieldValueInput {
    pub fn new(field_id: Uuid, value: impl Into<CandidateValue>) -> Self {
        Self {
            field_id,
            value: value.into(),
        }
    }
}

/// One row of a projection: a definition merged with the owner's value.
///
/// Placeholder rows (field exists for the scope, no value yet) have `id`,
/// `value` and both timestamps set to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedField {
    pub id: Option<Uuid>,
    pub owner_id: Uuid,
    pub field_id: Uuid,
    pub field_name: String,
    pub value_kind: ValueKind,
    pub is_required: bool,
    pub display_order: i32,
    /// Set when the definition was soft-deleted (history reads only)
    pub is_deleted: bool,
    pub value: Option<StoredValue>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectedField {
    pub fn is_placeholder(&self) -> bool {
        self.id.is_none()
    }
}
