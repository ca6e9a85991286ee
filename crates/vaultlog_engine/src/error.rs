//! Error types for the log engine.

use crate::store::StoreError;
use thiserror::Error;
use vaultlog_protocol::{ErrorCode, ErrorResponse};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the log engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request validation failed.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Caller does not own the required lock.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The requested snapshot does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A durable write failed; the caller may retry idempotently.
    #[error("transient write failure: {0}")]
    TransientWrite(String),

    /// Invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns the wire-level code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::BadInput(_) => ErrorCode::BadInput,
            EngineError::Unauthorized(_) => ErrorCode::Unauthorized,
            EngineError::NotFound(_) => ErrorCode::NotFound,
            EngineError::TransientWrite(_) => ErrorCode::TransientWriteFailure,
            EngineError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Returns true if this is a client error.
    pub fn is_client_error(&self) -> bool {
        self.code().is_client_error()
    }

    /// Maps a store failure onto the caller-facing taxonomy.
    ///
    /// `Conflict` never legitimately reaches a caller; the write path
    /// interprets it locally before surfacing anything.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => EngineError::NotFound(key),
            StoreError::Transient(msg) => EngineError::TransientWrite(msg),
            StoreError::Conflict => {
                EngineError::Internal("conditional write conflict escaped the write path".into())
            }
        }
    }

    fn detail(&self) -> &str {
        match self {
            EngineError::BadInput(msg)
            | EngineError::Unauthorized(msg)
            | EngineError::NotFound(msg)
            | EngineError::TransientWrite(msg)
            | EngineError::Internal(msg) => msg,
        }
    }
}

impl From<EngineError> for ErrorResponse {
    fn from(err: EngineError) -> Self {
        ErrorResponse::new(err.code(), err.detail())
    }
}
