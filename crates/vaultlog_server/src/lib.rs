//! # VaultLog Server
//!
//! Transport-agnostic dispatch surface for the vaultlog engine.
//!
//! This crate provides:
//! - [`LogServer`] — wires the engine components over one durable store
//! - Request dispatch over the tagged action envelope
//! - Streaming entry points for bundle uploads and snapshot downloads
//!
//! Transport framing, authentication, and session issuance live in outer
//! layers; they hand this crate validated user identities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod server;

pub use server::LogServer;
