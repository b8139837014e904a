//! Automation engine capability trait.
//!
//! The executor does not drive a browser itself; it delegates to an
//! [`AutomationEngine`] implementation. Production code wires in an engine
//! backed by a real browser-control stack; tests use [`ScriptedEngine`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

// ============================================================================
// AutomationEngine
// ============================================================================

/// The browser capability the dispatcher executes commands against.
///
/// Implementations may block on real browser work; the dispatcher bounds
/// every call with its own timeout, so a hung engine cannot starve
/// dispatch.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Navigates the browser to `url`.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Clicks the element matching `selector`.
    ///
    /// Returns a description of the element that was clicked.
    async fn click(&self, selector: &str) -> Result<String>;

    /// Types `text` into the element matching `selector`.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Captures a screenshot under `name`.
    ///
    /// Returns the filename the capture was stored under.
    async fn screenshot(&self, name: &str) -> Result<String>;
}

// ============================================================================
// EngineCall
// ============================================================================

/// One recorded call into a [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `navigate(url)`.
    Navigate(String),
    /// `click(selector)`.
    Click(String),
    /// `type_text(selector, text)`.
    Type {
        /// Target selector.
        selector: String,
        /// Typed text.
        text: String,
    },
    /// `screenshot(name)`.
    Screenshot(String),
}

// ============================================================================
// ScriptedEngine
// ============================================================================

/// Test engine that records calls in issue order and returns canned
/// outcomes.
///
/// Behavior is keyed by either the command kind (`"navigate"`) or the
/// call's primary argument (a URL, selector, or screenshot name), so a
/// single command can be slowed down or failed while its siblings run
/// normally.
#[derive(Default)]
pub struct ScriptedEngine {
    /// Calls in the order they were executed.
    calls: Mutex<Vec<EngineCall>>,
    /// Artificial delay per kind or argument.
    delays: Mutex<FxHashMap<String, Duration>>,
    /// Scripted failure message per kind or argument.
    failures: Mutex<FxHashMap<String, String>>,
}

impl ScriptedEngine {
    /// Creates an engine with no scripted behavior: every call succeeds
    /// immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays calls whose kind or primary argument equals `key`.
    #[must_use]
    pub fn with_delay(self, key: impl Into<String>, delay: Duration) -> Self {
        self.delays.lock().insert(key.into(), delay);
        self
    }

    /// Fails calls whose kind or primary argument equals `key`.
    #[must_use]
    pub fn with_failure(self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.lock().insert(key.into(), message.into());
        self
    }

    /// Returns the calls executed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Records a call at entry, then applies its scripted delay and
    /// failure.
    ///
    /// Recording first means `calls()` reflects the order calls were
    /// issued, not the order their delays elapsed.
    async fn run(&self, kind: &str, arg: &str, call: EngineCall) -> Result<()> {
        self.calls.lock().push(call);

        let delay = {
            let delays = self.delays.lock();
            delays.get(kind).or_else(|| delays.get(arg)).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let failures = self.failures.lock();
            failures.get(kind).or_else(|| failures.get(arg)).cloned()
        };

        match failure {
            Some(message) => Err(Error::execution(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AutomationEngine for ScriptedEngine {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.run("navigate", url, EngineCall::Navigate(url.to_string()))
            .await
    }

    async fn click(&self, selector: &str) -> Result<String> {
        self.run("click", selector, EngineCall::Click(selector.to_string()))
            .await?;
        Ok(format!("<{selector}>"))
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.run(
            "type",
            selector,
            EngineCall::Type {
                selector: selector.to_string(),
                text: text.to_string(),
            },
        )
        .await
    }

    async fn screenshot(&self, name: &str) -> Result<String> {
        self.run("screenshot", name, EngineCall::Screenshot(name.to_string()))
            .await?;
        Ok(format!("{name}.png"))
    }
}

// ============================================================================
// Tests
// ============================================================================
