//! Error types for the browser-relay protocol.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use browser_relay::{ControllerClient, Result};
//!
//! async fn example(client: &ControllerClient) -> Result<()> {
//!     client.navigate("https://example.com").await?;
//!     client.click("#submit").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::Disconnected`], [`Error::WebSocket`] |
//! | Protocol | [`Error::UnknownCommand`], [`Error::Protocol`] |
//! | Execution | [`Error::Execution`], [`Error::Timeout`] |
//! | Client | [`Error::QueueOverflow`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! No variant is process-fatal: a fault on one connection never prevents the
//! registry or dispatcher from serving other connections.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out waiting for the remote side to connect.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection was lost while a call was outstanding.
    ///
    /// Every pending call on a dropped connection resolves with this
    /// variant; none is left awaiting a response that will never arrive.
    #[error("Disconnected")]
    Disconnected,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The executor did not recognize the command kind.
    #[error("Unknown command kind: {kind}")]
    UnknownCommand {
        /// The unrecognized kind string.
        kind: String,
    },

    /// Protocol violation or unexpected envelope.
    ///
    /// Returned when a frame is malformed or a reply does not match the
    /// shape its correlated command requires.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// The automation engine reported a failure for a command.
    ///
    /// Carried back to the controller as an `error` envelope correlated to
    /// the originating command; the connection stays open.
    #[error("Execution failed: {message}")]
    Execution {
        /// Error message from the automation engine.
        message: String,
    },

    /// A pending call was not resolved within the configured duration.
    ///
    /// Local and recoverable; the caller may retry.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Client Errors
    // ========================================================================
    /// The outbound queue exceeded its configured size or age bound.
    ///
    /// The oldest queued command fails with this variant; newer commands
    /// stay queued for the next `connect()`.
    #[error("Queue overflow: {message}")]
    QueueOverflow {
        /// Which bound was exceeded.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an unknown command error.
    #[inline]
    pub fn unknown_command(kind: impl Into<String>) -> Self {
        Self::UnknownCommand { kind: kind.into() }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an execution error.
    #[inline]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a queue overflow error.
    #[inline]
    pub fn queue_overflow(message: impl Into<String>) -> Self {
        Self::QueueOverflow {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::Disconnected
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry, possibly after a
    /// `connect()`.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::Timeout { .. }
                | Self::Disconnected
                | Self::QueueOverflow { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
