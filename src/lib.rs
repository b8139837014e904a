//! Browser Relay - remote browser-automation command protocol.
//!
//! This library implements a bidirectional command/response protocol that
//! lets a remote controller drive a browser-automation executor over a
//! persistent WebSocket connection.
//!
//! # Architecture
//!
//! The protocol has two ends:
//!
//! - **Controller**: issues typed commands (`navigate`, `click`, `type`,
//!   `screenshot`) and awaits correlated responses
//! - **Executor**: accepts controllers, decodes commands, drives an
//!   [`AutomationEngine`], and replies
//!
//! Key design principles:
//!
//! - Every command carries a `correlationId` echoed in its response, so
//!   concurrent in-flight commands of the same kind stay disambiguated
//! - Commands issued before a connection exists queue up and flush in
//!   FIFO order on `connect()`, with explicit size and age bounds
//! - One writer task per connection; handler execution on its own task,
//!   never inline in the shared I/O loop
//! - No error is process-fatal: one connection's fault never stops the
//!   registry or dispatcher from serving others
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use browser_relay::{
//!     ConnectionRegistry, ControllerClient, Dispatcher, Result, ScriptedEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Executor side: registry + dispatcher over an automation engine.
//!     let engine = Arc::new(ScriptedEngine::new());
//!     let dispatcher = Arc::new(Dispatcher::new(engine));
//!     let registry = ConnectionRegistry::bind_local(dispatcher).await?;
//!
//!     // Controller side: typed calls over the wire.
//!     let client = ControllerClient::new();
//!     client.connect(&registry.ws_url()).await?;
//!     client.navigate("https://example.com").await?;
//!     client.click("#submit").await?;
//!     let filename = client.screenshot("result").await?;
//!     println!("captured {filename}");
//!
//!     client.disconnect();
//!     registry.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`controller`] | Typed client API and outbound queue |
//! | [`executor`] | Dispatcher, registry, and engine trait |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelope types |

// ============================================================================
// Modules
// ============================================================================

/// Controller side: typed command API and outbound queue.
pub mod controller;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Executor side: dispatcher, connection registry, and engine trait.
pub mod executor;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

// ============================================================================
// Re-exports
// ============================================================================

// Controller types
pub use controller::{ClientConfig, ControllerClient};

// Error types
pub use error::{Error, Result};

// Executor types
pub use executor::{AutomationEngine, ConnectionRegistry, Dispatcher, EngineCall, ScriptedEngine};

// Identifier types
pub use identifiers::{ConnectionId, CorrelationId};

// Protocol types
pub use protocol::{Command, CommandEnvelope, Reply, ReplyEnvelope};
