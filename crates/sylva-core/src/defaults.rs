//! Centralized default constants for the custom field engine.
//!
//! Organized by domain area. Storage crates and transport layers should
//! reference these instead of repeating magic numbers.

// =============================================================================
// FIELD DEFINITIONS
// =============================================================================

/// Maximum characters in a field definition name.
pub const FIELD_NAME_MAX_LEN: usize = 255;

/// Display order assigned when a definition is created without one.
pub const DISPLAY_ORDER: i32 = 0;

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum number of connections in the pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default minimum number of idle connections kept open.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Default connection acquire timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds (30 minutes).
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

/// PostgreSQL connection URL (required).
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

pub const ENV_DB_MAX_CONNECTIONS: &str = "SYLVA_DB_MAX_CONNECTIONS";

pub const ENV_DB_MIN_CONNECTIONS: &str = "SYLVA_DB_MIN_CONNECTIONS";

pub const ENV_DB_CONNECT_TIMEOUT_SECS: &str = "SYLVA_DB_CONNECT_TIMEOUT_SECS";

pub const ENV_DB_IDLE_TIMEOUT_SECS: &str = "SYLVA_DB_IDLE_TIMEOUT_SECS";
