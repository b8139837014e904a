//! Executor side: accepts controllers, decodes commands, drives the
//! engine, and replies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ws    ┌────────────────────┐       ┌──────────────────┐
//! │  Controller  │◄───────►│ ConnectionRegistry │──────►│    Dispatcher    │
//! │   (remote)   │         │  (accept + route)  │       │ (decode/execute) │
//! └──────────────┘         └────────────────────┘       └────────┬─────────┘
//!                                                                │
//!                                                                ▼
//!                                                       ┌──────────────────┐
//!                                                       │ AutomationEngine │
//!                                                       │  (trait object)  │
//!                                                       └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | Command resolution and reply construction |
//! | `engine` | Automation capability trait and test double |
//! | `registry` | Connection tracking, accept loop, per-connection I/O |

// ============================================================================
// Submodules
// ============================================================================

/// Command dispatch and reply construction.
pub mod dispatcher;

/// Automation engine capability trait.
pub mod engine;

/// Connection registry and accept loop.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::Dispatcher;
pub use engine::{AutomationEngine, EngineCall, ScriptedEngine};
pub use registry::ConnectionRegistry;
