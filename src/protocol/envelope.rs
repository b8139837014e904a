//! Envelope, command, and reply message types.
//!
//! Defines the message format for command requests and their correlated
//! replies between controller and executor.
//!
//! # Format
//!
//! Command:
//! ```json
//! {
//!   "correlationId": "uuid",
//!   "kind": "navigate",
//!   "url": "https://example.com"
//! }
//! ```
//!
//! Reply:
//! ```json
//! {
//!   "correlationId": "uuid",
//!   "kind": "navigate-response",
//!   "success": true,
//!   "url": "https://example.com"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::CorrelationId;

// ============================================================================
// Command
// ============================================================================

/// A command the controller can issue, tagged on the wire by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Command {
    /// Navigate the browser to a URL.
    #[serde(rename = "navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },

    /// Capture a screenshot under the given name.
    #[serde(rename = "screenshot")]
    Screenshot {
        /// Logical screenshot name.
        name: String,
    },

    /// Click the element matching a CSS selector.
    #[serde(rename = "click")]
    Click {
        /// CSS selector of the target element.
        selector: String,
    },

    /// Type text into the element matching a CSS selector.
    #[serde(rename = "type")]
    Type {
        /// CSS selector of the target element.
        selector: String,
        /// Text to type.
        text: String,
    },
}

impl Command {
    /// All command kinds the protocol defines.
    ///
    /// Single source of truth for capability negotiation: the registry
    /// advertises this list in the `welcome` envelope.
    pub const KINDS: [&'static str; 4] = ["navigate", "screenshot", "click", "type"];

    /// Returns the wire `kind` string of this command.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Screenshot { .. } => "screenshot",
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
        }
    }

    /// Returns `true` if `kind` names a command this protocol defines.
    #[inline]
    #[must_use]
    pub fn is_known_kind(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }
}

// ============================================================================
// Reply
// ============================================================================

/// A message the executor sends to the controller, tagged by `kind`.
///
/// Each command kind has a `<kind>-response` counterpart; `welcome` and
/// `error` complete the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Reply {
    /// Result of a `navigate` command.
    #[serde(rename = "navigate-response")]
    NavigateResponse {
        /// Whether navigation succeeded.
        success: bool,
        /// URL that was navigated to.
        url: String,
    },

    /// Result of a `screenshot` command.
    #[serde(rename = "screenshot-response")]
    ScreenshotResponse {
        /// Whether capture succeeded.
        success: bool,
        /// Filename the capture was stored under.
        filename: String,
    },

    /// Result of a `click` command.
    #[serde(rename = "click-response")]
    ClickResponse {
        /// Whether the click succeeded.
        success: bool,
        /// Description of the element that was clicked.
        element: String,
    },

    /// Result of a `type` command.
    #[serde(rename = "type-response")]
    TypeResponse {
        /// Whether typing succeeded.
        success: bool,
        /// Text that was typed.
        text: String,
    },

    /// Capability announcement, sent once per connection on accept.
    #[serde(rename = "welcome")]
    Welcome {
        /// Command kinds the executor currently supports.
        capabilities: Vec<String>,
    },

    /// Protocol or execution failure.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error description.
        error: String,
    },
}

impl Reply {
    /// Returns the wire `kind` string of this reply.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NavigateResponse { .. } => "navigate-response",
            Self::ScreenshotResponse { .. } => "screenshot-response",
            Self::ClickResponse { .. } => "click-response",
            Self::TypeResponse { .. } => "type-response",
            Self::Welcome { .. } => "welcome",
            Self::Error { .. } => "error",
        }
    }
}

// ============================================================================
// CommandEnvelope
// ============================================================================

/// One controller → executor wire frame.
///
/// The correlation id is mandatory: without it, concurrent in-flight
/// commands of the same kind cannot be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Token echoed verbatim in the correlated reply.
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,

    /// The command and its payload, flattened into the frame.
    #[serde(flatten)]
    pub command: Command,
}

impl CommandEnvelope {
    /// Wraps a command with a freshly generated correlation id.
    #[inline]
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            correlation_id: CorrelationId::generate(),
            command,
        }
    }
}

// ============================================================================
// ReplyEnvelope
// ============================================================================

/// One executor → controller wire frame.
///
/// `welcome` carries no correlation id; `error` echoes the offending
/// frame's id when it had one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Correlation id of the originating command, if any.
    #[serde(
        rename = "correlationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<CorrelationId>,

    /// The reply and its payload, flattened into the frame.
    #[serde(flatten)]
    pub reply: Reply,
}

impl ReplyEnvelope {
    /// Wraps a reply correlated to a command.
    #[inline]
    #[must_use]
    pub const fn correlated(correlation_id: CorrelationId, reply: Reply) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            reply,
        }
    }

    /// Wraps an uncorrelated reply (`welcome`, or `error` for a frame
    /// without an id).
    #[inline]
    #[must_use]
    pub const fn uncorrelated(reply: Reply) -> Self {
        Self {
            correlation_id: None,
            reply,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let envelope = CommandEnvelope::new(Command::Navigate {
            url: "https://example.com".to_string(),
        });

        let json = serde_json::to_string(&envelope).expect("serialize");
        assert!(json.contains("\"kind\":\"navigate\""));
        assert!(json.contains("\"url\":\"https://example.com\""));
        assert!(json.contains("correlationId"));
    }

    #[test]
    fn test_type_command_wire_kind() {
        let envelope = CommandEnvelope::new(Command::Type {
            selector: "#search".to_string(),
            text: "hello".to_string(),
        });

        let json = serde_json::to_string(&envelope).expect("serialize");
        assert!(json.contains("\"kind\":\"type\""));
        assert!(json.contains("\"selector\":\"#search\""));
        assert!(json.contains("\"text\":\"hello\""));
    }

    #[test]
    fn test_command_roundtrip() {
        let envelope = CommandEnvelope::new(Command::Click {
            selector: "#submit".to_string(),
        });

        let json = serde_json::to_string(&envelope).expect("serialize");
        let parsed: CommandEnvelope = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{
            "correlationId": "550e8400-e29b-41d4-a716-446655440000",
            "kind": "scroll",
            "amount": 100
        }"#;

        assert!(serde_json::from_str::<CommandEnvelope>(json).is_err());
    }

    #[test]
    fn test_missing_payload_field_rejected() {
        // A navigate frame without its url is not a valid command.
        let json = r#"{
            "correlationId": "550e8400-e29b-41d4-a716-446655440000",
            "kind": "navigate"
        }"#;

        assert!(serde_json::from_str::<CommandEnvelope>(json).is_err());
    }

    #[test]
    fn test_missing_correlation_id_rejected() {
        let json = r#"{"kind": "navigate", "url": "https://example.com"}"#;
        assert!(serde_json::from_str::<CommandEnvelope>(json).is_err());
    }

    #[test]
    fn test_reply_serialization() {
        let envelope = ReplyEnvelope::correlated(
            CorrelationId::generate(),
            Reply::ScreenshotResponse {
                success: true,
                filename: "login.png".to_string(),
            },
        );

        let json = serde_json::to_string(&envelope).expect("serialize");
        assert!(json.contains("\"kind\":\"screenshot-response\""));
        assert!(json.contains("\"filename\":\"login.png\""));
    }

    #[test]
    fn test_welcome_has_no_correlation_id() {
        let envelope = ReplyEnvelope::uncorrelated(Reply::Welcome {
            capabilities: Command::KINDS.iter().map(|s| s.to_string()).collect(),
        });

        let json = serde_json::to_string(&envelope).expect("serialize");
        assert!(!json.contains("correlationId"));
        assert!(json.contains("\"capabilities\":[\"navigate\",\"screenshot\",\"click\",\"type\"]"));
    }

    #[test]
    fn test_error_reply_roundtrip() {
        let id = CorrelationId::generate();
        let envelope = ReplyEnvelope::correlated(
            id,
            Reply::Error {
                error: "Unknown command kind: scroll".to_string(),
            },
        );

        let json = serde_json::to_string(&envelope).expect("serialize");
        let parsed: ReplyEnvelope = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.correlation_id, Some(id));
        assert_eq!(parsed.reply.kind(), "error");
    }

    #[test]
    fn test_command_kind_strings() {
        assert_eq!(
            Command::Navigate {
                url: String::new()
            }
            .kind(),
            "navigate"
        );
        assert_eq!(
            Command::Type {
                selector: String::new(),
                text: String::new()
            }
            .kind(),
            "type"
        );
        assert!(Command::is_known_kind("click"));
        assert!(!Command::is_known_kind("scroll"));
    }
}
