//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches

pub mod cycle;
pub mod delivery_log;
pub mod pending;
pub mod push_subscription;
pub mod rule;
pub mod status;
pub mod subscriber;
pub mod tenant;
