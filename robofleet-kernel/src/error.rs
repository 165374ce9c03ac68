use thiserror::Error;

/// Erreurs typées renvoyées aux appelants du kernel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("alert not found: {0}")]
    NotFound(u64),
    #[error("unauthorized visitor: {0}")]
    Unauthorized(String),
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
    #[error("notification failed: {0}")]
    Notify(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::Validation(e.to_string())
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
