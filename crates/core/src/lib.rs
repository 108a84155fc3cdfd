//! Domain logic for the clinic notification engine.
//!
//! Pure types and calculations shared by the database layer, the delivery
//! channels, the background worker and the HTTP API. Nothing in this crate
//! performs I/O.

pub mod channels;
pub mod cycle;
pub mod default_rules;
pub mod error;
pub mod evaluation;
pub mod preferences;
pub mod retry;
pub mod rules;
pub mod template;
pub mod types;
