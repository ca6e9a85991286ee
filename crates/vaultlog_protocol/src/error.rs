//! Error codes surfaced to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Request validation failed; never retried.
    BadInput,
    /// Caller does not own the required lock.
    Unauthorized,
    /// The requested snapshot does not exist.
    NotFound,
    /// A durable write failed; the caller may retry idempotently.
    TransientWriteFailure,
    /// Invariant violation; should not occur in steady state.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::BadInput => "BadInput",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::TransientWriteFailure => "TransientWriteFailure",
            ErrorCode::Internal => "Internal",
        };
        f.write_str(name)
    }
}

impl ErrorCode {
    /// Returns true if this is a client error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::BadInput | ErrorCode::Unauthorized | ErrorCode::NotFound
        )
    }

    /// Returns true if this is a server-side error.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::TransientWriteFailure | ErrorCode::Internal
        )
    }
}

/// The error envelope returned for any failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// The error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorResponse {
    /// Creates an error envelope.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a `BadInput` envelope.
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadInput, message)
    }
}
