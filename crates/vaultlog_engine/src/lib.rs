//! # VaultLog Engine
//!
//! The server-side core of an end-to-end encrypted, per-user database
//! service. Each user owns an append-only log of opaque encrypted records;
//! the engine arbitrates ordering, durability, and delivery of those
//! records without ever seeing plaintext.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  TransactionEngine                    │
//! │  (validate, allocate sequence, persist, roll back)    │
//! └───────┬──────────────────────────────────┬───────────┘
//!         │                                  │
//! ┌───────▼───────────┐          ┌───────────▼───────────┐
//! │     OplogCache    │          │   BundleCoordinator   │
//! │  (per-user log    │◀─────────│  (snapshot uploads,   │
//! │   projection)     │ truncate │   watermark advance)  │
//! └───────┬───────────┘          └───────────┬───────────┘
//!         │                                  │
//! ┌───────▼──────────────────────────────────▼───────────┐
//! │                DurableStore (trait)                   │
//! │  (conditional record puts, user records, blob I/O)    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! - **Monotone sequence**: per user, accepted writes receive the compact
//!   sequence range `[0, n)` with no duplicates
//! - **Terminal slots**: every allocated slot ends Committed or RolledBack;
//!   a sequence number is never silently lost
//! - **Committed reads**: log tails expose committed entries only, with
//!   gaps preserved for rolled-back slots
//! - **Advisory bundling**: snapshot correctness derives from watermark
//!   monotonicity, not from lock exclusivity

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bundle;
mod bundle_lock;
mod config;
mod engine;
mod error;
mod oplog;
mod read;
mod store;

pub use bundle::BundleCoordinator;
pub use bundle_lock::BundleLocks;
pub use config::EngineConfig;
pub use engine::TransactionEngine;
pub use error::{EngineError, EngineResult};
pub use oplog::{OplogCache, SlotState};
pub use read::ReadPath;
pub use store::{
    body_from_bytes, DurableStore, MemoryStore, ObjectBody, ObjectDownload, PutFault, StoreError,
    StoreResult, UserRecord, WritePredicate,
};
