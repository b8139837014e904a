//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//!
//! | Type | Backing | Generated by |
//! |------|---------|--------------|
//! | [`CorrelationId`] | UUID v4 | Controller, one per outbound command |
//! | [`ConnectionId`] | monotone `u64` | Registry, one per accepted transport |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CorrelationId
// ============================================================================

/// Opaque per-command token matching a response to its originating request.
///
/// Generated by the controller for every outbound command and echoed
/// verbatim by the executor in the correlated response. Random UUIDs keep
/// ids unique across reconnects, so a stale response from a previous
/// connection can never resolve a new call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh random correlation id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a correlation id from its string form.
    ///
    /// Returns `None` if the string is not a valid UUID.
    #[inline]
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Process-wide connection counter.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier for one live transport session on the executor side.
///
/// Drawn from a monotone counter and never reused for the lifetime of the
/// process, which keeps any outstanding pending call unambiguous about
/// which connection it was issued on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next connection id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
