//! # sylva-core
//!
//! Custom field engine for collection records.
//!
//! Administrators declare typed fields per scope (project, location type,
//! event type); owner records (accessions, plants, locations, events) then
//! carry values for those fields. This crate holds the storage-agnostic
//! part: the data model, value validation, projection, and the
//! [`FieldEngine`] that drives a [`FieldStore`] backend.

pub mod defaults;
pub mod engine;
pub mod error;
pub mod logging;
pub mod memory;
pub mod models;
pub mod projection;
pub mod traits;
pub mod validation;

// Re-export commonly used types at crate root
pub use engine::FieldEngine;
pub use error::{Error, Result};
pub use memory::MemoryFieldStore;
pub use models::*;
pub use traits::*;
pub use validation::{validate_definition, validate_required, validate_value};
