use thiserror::Error;

/// Failures surfaced to the caller of the evaluation harness.
///
/// Anything that goes wrong while running a single candidate is *not* an
/// `EvalError`: it becomes an `Exception` outcome for that candidate.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("code execution is disabled; set allow_code_execution to run untrusted programs")]
    ExecutionNotAllowed,

    #[error("evaluation interrupted before all problems finished")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvalError>;
