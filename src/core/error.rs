//! Engine error taxonomy

use super::note::NoteId;
use crate::core::ids::log;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the store, the registry and the execution engine.
///
/// Everything below the scheduler is caught at the attempt boundary and turned
/// into a Memory Note; nothing here reaches the process as a fault.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("note not found: {0}")]
    NoteNotFound(NoteId),
    #[error("capability not found: {0}")]
    CapabilityNotFound(String),
    #[error("invalid input for '{capability}': {reason}")]
    Validation { capability: String, reason: String },
    #[error("capability '{capability}' failed: {message}")]
    Execution { capability: String, message: String },
    #[error("{}", log::RETRIES_EXHAUSTED)]
    RetryExhausted { id: NoteId, attempts: u32 },
    #[error("store: {0}")]
    Store(String),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn validation(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation { capability: capability.into(), reason: reason.into() }
    }

    /// Wrap an error raised inside `Capability::call`. Engine errors raised by
    /// built-ins keep their kind; anything else becomes `Execution`.
    pub fn from_capability(capability: &str, err: anyhow::Error) -> Self {
        match err.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(other) => Self::Execution { capability: capability.into(), message: format!("{:#}", other) },
        }
    }
}
