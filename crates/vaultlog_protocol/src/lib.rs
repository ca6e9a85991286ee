//! # VaultLog Protocol
//!
//! Wire-level types for the vaultlog transaction log service.
//!
//! This crate provides:
//! - `Transaction` and `Command` — the per-user log unit
//! - `Request` / `Response` — the tagged action envelope
//! - `ErrorCode` / `ErrorResponse` — the error surface for callers
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - A transaction's `(user_id, sequence_no)` pair is immutable once
//!   persisted; the only permitted rewrite is to `Command::Rollback`
//! - Unknown action tags fail request parsing and surface as `BadInput`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod transaction;

pub use error::{ErrorCode, ErrorResponse};
pub use messages::{Request, Response, TransactionLogResponse, WriteCommand};
pub use transaction::{Command, Transaction};
