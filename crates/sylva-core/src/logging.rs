//! Structured logging field name constants.
//!
//! All crates use these constants for consistent `tracing` fields so that
//! log aggregation can query by the same names in every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Misconfigured stored data (e.g. a pattern that no longer compiles) |
//! | WARN  | Rejected writes: name conflicts, locked type changes, missing fields |
//! | INFO  | Completed mutations of definitions and values |
//! | DEBUG | Decision points: projection mode, lock lookups |
//! | TRACE | Per-row iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "fields", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "engine", "validator", "pool", "pg_store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create_definition", "apply_values", "project"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Owner kind ("accession", "plant", "location", "event").
pub const OWNER_KIND: &str = "owner_kind";

/// Scope (project, location type, event type) UUID.
pub const SCOPE_ID: &str = "scope_id";

/// Field definition UUID.
pub const FIELD_ID: &str = "field_id";

/// Owner record UUID.
pub const OWNER_ID: &str = "owner_id";

/// Field definition name.
pub const FIELD_NAME: &str = "field_name";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows returned or written.
pub const RESULT_COUNT: &str = "result_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table affected.
pub const DB_TABLE: &str = "db_table";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_unique_snake_case() {
        let names = [
            SUBSYSTEM,
            COMPONENT,
            OPERATION,
            OWNER_KIND,
            SCOPE_ID,
            FIELD_ID,
            OWNER_ID,
            FIELD_NAME,
            DURATION_MS,
            RESULT_COUNT,
            POOL_SIZE,
            POOL_IDLE,
            DB_TABLE,
            ERROR_MSG,
        ];
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        for name in names {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
    }
}
