//! Command dispatch and reply construction.
//!
//! The dispatcher turns one inbound frame into exactly one reply envelope:
//! a `<kind>-response` on success, an `error` reply on any failure. No
//! dispatch outcome closes the connection; bad commands are a client
//! error, not fatal.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::poll_immediate;
use serde_json::{Value, from_str};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::executor::engine::AutomationEngine;
use crate::identifiers::CorrelationId;
use crate::protocol::{Command, CommandEnvelope, Reply, ReplyEnvelope};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on a single engine call, so a hung browser action cannot
/// starve the dispatcher.
const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Dispatcher
// ============================================================================

/// Resolves decoded envelopes to engine calls and emits correlated replies.
///
/// Handlers are pure with respect to connection state: the dispatcher holds
/// no per-connection data and a single instance serves every connection in
/// a registry.
pub struct Dispatcher {
    /// The automation capability commands execute against.
    engine: Arc<dyn AutomationEngine>,
    /// Bound on one engine call.
    engine_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher backed by `engine` with the default engine
    /// timeout (30s).
    #[must_use]
    pub fn new(engine: Arc<dyn AutomationEngine>) -> Self {
        Self {
            engine,
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    /// Overrides the per-call engine timeout.
    #[must_use]
    pub fn with_engine_timeout(mut self, engine_timeout: Duration) -> Self {
        self.engine_timeout = engine_timeout;
        self
    }

    /// Returns the command kinds this dispatcher supports.
    ///
    /// The registry advertises this list in the `welcome` envelope.
    #[must_use]
    pub fn capabilities(&self) -> Vec<String> {
        Command::KINDS.iter().map(|s| (*s).to_string()).collect()
    }

    /// Dispatches one inbound text frame and returns the reply to send.
    ///
    /// Total over all inputs: malformed frames, unknown kinds, invalid
    /// payloads, engine failures, and engine timeouts all map to an `error`
    /// reply (with the correlation id echoed whenever the frame carried
    /// one) rather than a fault.
    pub async fn dispatch(&self, text: &str) -> ReplyEnvelope {
        let (issued_tx, _issued_rx) = oneshot::channel();
        self.dispatch_tracked(text, issued_tx).await
    }

    /// Like [`dispatch`](Self::dispatch), but fires `issued` as soon as the
    /// engine call has started (or the frame was rejected without one).
    ///
    /// A caller running handlers on their own tasks can await the signal
    /// before dispatching its next frame, so calls reach the engine in
    /// frame order while completions stay concurrent.
    pub async fn dispatch_tracked(
        &self,
        text: &str,
        issued: oneshot::Sender<()>,
    ) -> ReplyEnvelope {
        let envelope = match from_str::<CommandEnvelope>(text) {
            Ok(envelope) => envelope,
            Err(_) => {
                let _ = issued.send(());
                return Self::reject_frame(text);
            }
        };

        let correlation_id = envelope.correlation_id;
        let kind = envelope.command.kind();
        debug!(%correlation_id, kind, "Dispatching command");

        let mut call = Box::pin(self.execute(envelope.command));
        let outcome = match timeout(self.engine_timeout, async {
            // The first poll enters the engine call; only then release
            // the signal, so observed call order matches frame order.
            let first = poll_immediate(call.as_mut()).await;
            let _ = issued.send(());
            match first {
                Some(outcome) => outcome,
                None => call.as_mut().await,
            }
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::timeout(kind, self.engine_timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(reply) => ReplyEnvelope::correlated(correlation_id, reply),
            Err(e) => {
                warn!(%correlation_id, kind, error = %e, "Command failed");
                ReplyEnvelope::correlated(
                    correlation_id,
                    Reply::Error {
                        error: e.to_string(),
                    },
                )
            }
        }
    }

    /// Executes a decoded command against the engine.
    async fn execute(&self, command: Command) -> Result<Reply> {
        match command {
            Command::Navigate { url } => {
                self.engine.navigate(&url).await?;
                Ok(Reply::NavigateResponse { success: true, url })
            }
            Command::Screenshot { name } => {
                let filename = self.engine.screenshot(&name).await?;
                Ok(Reply::ScreenshotResponse {
                    success: true,
                    filename,
                })
            }
            Command::Click { selector } => {
                let element = self.engine.click(&selector).await?;
                Ok(Reply::ClickResponse {
                    success: true,
                    element,
                })
            }
            Command::Type { selector, text } => {
                self.engine.type_text(&selector, &text).await?;
                Ok(Reply::TypeResponse {
                    success: true,
                    text,
                })
            }
        }
    }

    /// Builds the `error` reply for a frame that failed typed decoding.
    ///
    /// Salvages `kind` and `correlationId` from the raw JSON where present
    /// so the error names the offending kind and stays correlated.
    fn reject_frame(text: &str) -> ReplyEnvelope {
        let value = from_str::<Value>(text).ok();

        let kind = value
            .as_ref()
            .and_then(|v| v.get("kind"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let correlation_id = value
            .as_ref()
            .and_then(|v| v.get("correlationId"))
            .and_then(Value::as_str)
            .and_then(CorrelationId::parse);

        let error = match kind {
            Some(kind) if Command::is_known_kind(&kind) => {
                Error::protocol(format!("invalid payload for kind: {kind}")).to_string()
            }
            Some(kind) => Error::unknown_command(kind).to_string(),
            None => Error::protocol("malformed frame").to_string(),
        };

        warn!(error, "Rejected inbound frame");

        ReplyEnvelope {
            correlation_id,
            reply: Reply::Error { error },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
