//! Background side of the notification engine.
//!
//! The [`evaluator`] turns rules and patient state into queued
//! notifications, the [`dispatcher`] delivers them over push and email, and
//! the [`scheduler`] runs both on their clocks. The binary in `main.rs`
//! wires them to the environment.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod scheduler;
