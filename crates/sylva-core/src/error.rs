//! Error types for the custom field engine.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using sylva's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for custom field operations.
///
/// Every variant except `Database`, `Serialization`, `Config`, `Internal` and
/// `InvalidPattern` is a caller input error and should surface as a 4xx.
#[derive(Error, Debug)]
pub enum Error {
    /// Another active definition in the same scope already uses this name
    #[error("Field '{name}' already exists in this scope")]
    SchemaConflict { scope_id: Uuid, name: String },

    /// The definition has stored values, so its value kind is frozen
    #[error("Cannot change the type of field '{name}': it already has values")]
    LockedTypeChange { field_id: Uuid, name: String },

    /// Field id is unknown, soft-deleted, or belongs to another scope
    #[error("Field {0} not found in this scope")]
    UnknownField(Uuid),

    /// Active required fields absent from a submission
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),

    /// Candidate value has the wrong runtime type for the field
    #[error("Field '{field}' must be a {expected}")]
    ValueType { field: String, expected: &'static str },

    /// Candidate value violates a length, pattern, range or option constraint
    #[error("Field '{field}' {message}")]
    ConstraintViolation { field: String, message: String },

    /// Definition attributes are inconsistent (bad bounds, empty name, ...)
    #[error("Invalid field definition: {0}")]
    InvalidDefinition(String),

    /// A stored validation pattern does not compile
    #[error("Invalid validation pattern for field {field_id}: {message}")]
    InvalidPattern { field_id: Uuid, message: String },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::SchemaConflict { .. }
                | Error::LockedTypeChange { .. }
                | Error::UnknownField(_)
                | Error::MissingRequiredFields(_)
                | Error::ValueType { .. }
                | Error::ConstraintViolation { .. }
                | Error::InvalidDefinition(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
        )
    }

    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::SchemaConflict { .. } | Error::LockedTypeChange { .. } => 409,
            e if e.is_client_error() => 400,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
