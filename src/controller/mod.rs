//! Controller side: the typed command API and its outbound queue.
//!
//! External callers hold a [`ControllerClient`] and never see envelopes:
//! each method call becomes a correlated command on the wire, and the
//! returned future resolves when the matching response arrives.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Typed API surface, pending calls, receive loop |
//! | `queue` | Bounded FIFO buffer for commands issued while disconnected |

// ============================================================================
// Submodules
// ============================================================================

/// Controller client and its receive loop.
pub mod client;

/// Outbound command queue.
mod queue;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{ClientConfig, ControllerClient};
