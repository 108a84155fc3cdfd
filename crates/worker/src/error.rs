use clinica_core::error::CoreError;

/// Errors that abort an evaluator pass or a dispatch cycle.
///
/// Rule-data problems never surface here; they are recorded on the rule
/// (`last_error`) and the pass moves on.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
