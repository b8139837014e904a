//! Wire protocol message types.
//!
//! This module defines the JSON envelope format exchanged between the
//! controller and the executor. One envelope travels per WebSocket text
//! frame.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`CommandEnvelope`] | Controller → Executor | Command request |
//! | [`ReplyEnvelope`] | Executor → Controller | Response, `welcome`, or `error` |
//!
//! Every command carries a `correlationId` echoed verbatim in its reply, so
//! concurrent in-flight commands of the same kind stay disambiguated.

// ============================================================================
// Submodules
// ============================================================================

/// Envelope, command, and reply definitions.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Command, CommandEnvelope, Reply, ReplyEnvelope};
