//! Controller client and its receive loop.
//!
//! The client is the typed API surface external callers use. Each command
//! method allocates a correlation id, registers a pending call, and either
//! sends immediately or parks the command in the outbound queue until
//! `connect()`.
//!
//! # Thread Safety
//!
//! `ControllerClient` is a cheap handle: clone it freely across tasks. The
//! pending-call map and outbound queue are mutated under locks because the
//! send path and the background receive loop proceed concurrently.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, warn};

use crate::controller::queue::{OutboundQueue, QueuedCommand};
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{Command, CommandEnvelope, Reply, ReplyEnvelope};

// ============================================================================
// Types
// ============================================================================

/// The controller's half of a WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// ClientConfig
// ============================================================================

/// Tunables for the controller client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long `connect()` may spend on the WebSocket handshake before
    /// failing with [`Error::ConnectionTimeout`].
    pub connect_timeout: Duration,

    /// How long a pending call may stay unresolved before failing with
    /// [`Error::Timeout`].
    pub command_timeout: Duration,

    /// Maximum commands buffered while disconnected; pushing past this
    /// bound fails the oldest entry with [`Error::QueueOverflow`].
    pub max_queued: usize,

    /// Maximum age of a queued command at flush time; older entries fail
    /// with [`Error::QueueOverflow`].
    pub max_queue_age: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            max_queued: 64,
            max_queue_age: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Sets the handshake timeout for `connect()`.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the pending-call timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Sets the outbound queue size bound.
    #[must_use]
    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = max_queued;
        self
    }

    /// Sets the outbound queue age bound.
    #[must_use]
    pub fn with_max_queue_age(mut self, max_queue_age: Duration) -> Self {
        self.max_queue_age = max_queue_age;
        self
    }
}

// ============================================================================
// PendingCall
// ============================================================================

/// Controller-side record of one issued, not-yet-resolved command.
struct PendingCall {
    /// Completion handle the response (or timeout/disconnect) resolves.
    tx: oneshot::Sender<Result<Reply>>,
    /// When the command was issued.
    issued: Instant,
}

// ============================================================================
// LinkState
// ============================================================================

/// The client's view of its transport: either a live writer or a queue.
struct LinkState {
    /// Feed into the writer task while connected.
    writer: Option<mpsc::UnboundedSender<Message>>,
    /// Commands issued while disconnected.
    queue: OutboundQueue,
    /// Bumped on every `connect()`; lets a stale receive loop detect that
    /// it no longer owns the link.
    epoch: u64,
}

// ============================================================================
// ControllerClient
// ============================================================================

/// Typed command API over one executor connection.
///
/// # Example
///
/// ```ignore
/// use browser_relay::{ControllerClient, Result};
///
/// async fn login(url: &str) -> Result<()> {
///     let client = ControllerClient::new();
///     client.connect(url).await?;
///     client.navigate("https://example.com/login").await?;
///     client.type_text("#user", "admin").await?;
///     client.click("#submit").await?;
///     client.screenshot("after-login").await?;
///     client.disconnect();
///     Ok(())
/// }
/// ```
pub struct ControllerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    /// Pending calls by correlation id (shared with the receive loop).
    pending: Mutex<FxHashMap<CorrelationId, PendingCall>>,
    /// Transport state: live writer or outbound queue.
    link: Mutex<LinkState>,
    /// Capabilities announced by the executor's `welcome`.
    capabilities: Mutex<Option<Vec<String>>>,
}

impl Clone for ControllerClient {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for ControllerClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ControllerClient - Construction
// ============================================================================

impl ControllerClient {
    /// Creates a disconnected client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a disconnected client with the given configuration.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let max_queued = config.max_queued;
        Self {
            inner: Arc::new(ClientInner {
                config,
                pending: Mutex::new(FxHashMap::default()),
                link: Mutex::new(LinkState {
                    writer: None,
                    queue: OutboundQueue::new(max_queued),
                    epoch: 0,
                }),
                capabilities: Mutex::new(None),
            }),
        }
    }
}

// ============================================================================
// ControllerClient - Connection Lifecycle
// ============================================================================

impl ControllerClient {
    /// Connects to an executor and flushes any queued commands.
    ///
    /// Queued commands are flushed strictly in FIFO order before the
    /// writer becomes visible to newly issued commands, so nothing issued
    /// after `connect()` can overtake them. Entries older than the
    /// configured age bound fail with [`Error::QueueOverflow`] instead of
    /// being sent.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if already connected
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds the
    ///   configured connect timeout
    /// - [`Error::WebSocket`] if the WebSocket handshake fails
    pub async fn connect(&self, url: &str) -> Result<()> {
        if self.is_connected() {
            return Err(Error::connection("already connected"));
        }

        let connect_timeout = self.inner.config.connect_timeout;
        let (ws_stream, _) = timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;
        let (ws_write, ws_read) = ws_stream.split();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::write_loop(writer_rx, ws_write));

        // Flush and install the writer under one lock so no new command
        // can overtake the queued ones.
        let epoch = {
            let mut link = self.inner.link.lock();

            // Re-check under the lock: a concurrent connect() may have won
            // the handshake race. Returning here drops writer_tx, which
            // ends the writer task and closes the extra socket.
            if link.writer.is_some() {
                return Err(Error::connection("already connected"));
            }

            let now = Instant::now();
            let max_age = self.inner.config.max_queue_age;
            for stale in link.queue.take_expired(max_age, now) {
                self.inner.fail_pending(
                    stale.correlation_id(),
                    Error::queue_overflow(format!(
                        "queued command exceeded max age of {}ms",
                        max_age.as_millis()
                    )),
                );
            }

            for queued in link.queue.drain() {
                let correlation_id = queued.correlation_id();
                // The caller may have timed out while we were offline.
                if !self.inner.pending.lock().contains_key(&correlation_id) {
                    debug!(%correlation_id, "Skipping flush of resolved command");
                    continue;
                }
                match to_string(&queued.envelope) {
                    Ok(json) => {
                        if writer_tx.send(Message::Text(json.into())).is_err() {
                            self.inner.fail_pending(correlation_id, Error::Disconnected);
                        }
                    }
                    Err(e) => {
                        self.inner.fail_pending(correlation_id, Error::Json(e));
                    }
                }
            }

            link.writer = Some(writer_tx);
            link.epoch += 1;
            link.epoch
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(Self::read_loop(ws_read, inner, epoch));

        debug!(url, "Controller connected");
        Ok(())
    }

    /// Disconnects from the executor.
    ///
    /// Every in-flight pending call resolves with [`Error::Disconnected`];
    /// queued-but-unsent commands stay in the outbound queue for the next
    /// `connect()`.
    pub fn disconnect(&self) {
        let epoch = self.inner.link.lock().epoch;
        self.inner.handle_disconnect(epoch);
    }

    /// Returns `true` if a live connection exists.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.link.lock().writer.is_some()
    }

    /// Returns the capabilities the executor announced, if any `welcome`
    /// has been received.
    #[must_use]
    pub fn capabilities(&self) -> Option<Vec<String>> {
        self.inner.capabilities.lock().clone()
    }

    /// Returns the number of unresolved pending calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the number of commands waiting in the outbound queue.
    #[inline]
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.link.lock().queue.len()
    }
}

// ============================================================================
// ControllerClient - Commands
// ============================================================================

impl ControllerClient {
    /// Navigates the remote browser to `url`.
    ///
    /// Returns the URL reported by the executor.
    pub async fn navigate(&self, url: impl Into<String>) -> Result<String> {
        match self.issue(Command::Navigate { url: url.into() }).await? {
            Reply::NavigateResponse { success: true, url } => Ok(url),
            Reply::NavigateResponse { success: false, url } => {
                Err(Error::execution(format!("navigate to {url} reported failure")))
            }
            other => Err(unexpected_reply("navigate", &other)),
        }
    }

    /// Clicks the element matching `selector`.
    ///
    /// Returns the executor's description of the clicked element.
    pub async fn click(&self, selector: impl Into<String>) -> Result<String> {
        let command = Command::Click {
            selector: selector.into(),
        };
        match self.issue(command).await? {
            Reply::ClickResponse {
                success: true,
                element,
            } => Ok(element),
            Reply::ClickResponse { success: false, .. } => {
                Err(Error::execution("click reported failure"))
            }
            other => Err(unexpected_reply("click", &other)),
        }
    }

    /// Types `text` into the element matching `selector`.
    ///
    /// Returns the text the executor confirmed typing.
    pub async fn type_text(
        &self,
        selector: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<String> {
        let command = Command::Type {
            selector: selector.into(),
            text: text.into(),
        };
        match self.issue(command).await? {
            Reply::TypeResponse {
                success: true,
                text,
            } => Ok(text),
            Reply::TypeResponse { success: false, .. } => {
                Err(Error::execution("type reported failure"))
            }
            other => Err(unexpected_reply("type", &other)),
        }
    }

    /// Captures a screenshot under `name`.
    ///
    /// Returns the filename the executor stored the capture under.
    pub async fn screenshot(&self, name: impl Into<String>) -> Result<String> {
        match self.issue(Command::Screenshot { name: name.into() }).await? {
            Reply::ScreenshotResponse {
                success: true,
                filename,
            } => Ok(filename),
            Reply::ScreenshotResponse { success: false, .. } => {
                Err(Error::execution("screenshot reported failure"))
            }
            other => Err(unexpected_reply("screenshot", &other)),
        }
    }

    /// Issues a command and awaits its correlated reply.
    ///
    /// Sends immediately when a connection is live, otherwise queues. The
    /// returned future resolves with the matching reply, or fails with
    /// [`Error::Timeout`], [`Error::Disconnected`], or
    /// [`Error::QueueOverflow`].
    async fn issue(&self, command: Command) -> Result<Reply> {
        let envelope = CommandEnvelope::new(command);
        let correlation_id = envelope.correlation_id;
        let kind = envelope.command.kind();
        let issued = Instant::now();

        // Serialize outside the link lock; failure here has no pending
        // entry to clean up yet.
        let json = to_string(&envelope)?;

        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .insert(correlation_id, PendingCall { tx, issued });

        let evicted = {
            let mut link = self.inner.link.lock();
            let state = &mut *link;
            match &state.writer {
                Some(writer) => {
                    if writer.send(Message::Text(json.into())).is_err() {
                        // Writer task already gone; the receive loop will
                        // tear the link down, but this call fails now.
                        self.inner.pending.lock().remove(&correlation_id);
                        return Err(Error::Disconnected);
                    }
                    None
                }
                None => state.queue.push(QueuedCommand { envelope, issued }),
            }
        };

        if let Some(evicted) = evicted {
            self.inner.fail_pending(
                evicted.correlation_id(),
                Error::queue_overflow(format!(
                    "capacity of {} queued commands exceeded",
                    self.inner.config.max_queued
                )),
            );
        }

        debug!(%correlation_id, kind, "Command issued");

        let command_timeout = self.inner.config.command_timeout;
        match timeout(command_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                self.inner.pending.lock().remove(&correlation_id);
                Err(Error::timeout(kind, command_timeout.as_millis() as u64))
            }
        }
    }
}

// ============================================================================
// ControllerClient - I/O Loops
// ============================================================================

impl ControllerClient {
    /// Single writer for the connection: drains the channel into the sink
    /// so frames never interleave.
    async fn write_loop(
        mut writer_rx: mpsc::UnboundedReceiver<Message>,
        mut ws_write: SplitSink<WsStream, Message>,
    ) {
        while let Some(message) = writer_rx.recv().await {
            if let Err(e) = ws_write.send(message).await {
                debug!(error = %e, "Write failed");
                break;
            }
        }

        let _ = ws_write.close().await;
        debug!("Writer terminated");
    }

    /// Receive loop: resolves pending calls and records capabilities.
    async fn read_loop(mut ws_read: SplitStream<WsStream>, inner: Arc<ClientInner>, epoch: u64) {
        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Text(text)) => inner.handle_frame(&text),

                Ok(Message::Close(_)) => {
                    debug!("WebSocket closed by executor");
                    break;
                }

                Err(e) => {
                    error!(error = %e, "WebSocket error");
                    break;
                }

                // Ignore Binary, Ping, Pong
                _ => {}
            }
        }

        inner.handle_disconnect(epoch);
        debug!("Receive loop terminated");
    }
}

// ============================================================================
// ClientInner
// ============================================================================

impl ClientInner {
    /// Routes one inbound frame from the executor.
    fn handle_frame(&self, text: &str) {
        let envelope = match from_str::<ReplyEnvelope>(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Failed to parse inbound frame");
                return;
            }
        };

        if let Reply::Welcome { capabilities } = &envelope.reply {
            debug!(?capabilities, "Welcome received");
            *self.capabilities.lock() = Some(capabilities.clone());
            return;
        }

        let Some(correlation_id) = envelope.correlation_id else {
            warn!(kind = envelope.reply.kind(), "Uncorrelated reply dropped");
            return;
        };

        let Some(call) = self.pending.lock().remove(&correlation_id) else {
            // Unknown or already-resolved id: protocol anomaly, never
            // fatal for the connection.
            warn!(%correlation_id, "Reply for unknown pending call dropped");
            return;
        };

        debug!(
            %correlation_id,
            age_ms = call.issued.elapsed().as_millis() as u64,
            "Pending call resolved"
        );

        let result = match envelope.reply {
            Reply::Error { error } => Err(Error::execution(error)),
            reply => Ok(reply),
        };
        let _ = call.tx.send(result);
    }

    /// Tears down the link for `epoch`.
    ///
    /// In order: fail every in-flight pending call with `Disconnected`,
    /// stop further writes by dropping the writer, forget the announced
    /// capabilities, leave the queue intact for the next `connect()`. A
    /// stale loop from an earlier connection is a no-op here.
    fn handle_disconnect(&self, epoch: u64) {
        let queued_ids = {
            let mut link = self.link.lock();
            if link.epoch != epoch {
                return;
            }
            link.writer = None;
            link.queue.correlation_ids()
        };

        // Capabilities belong to the dropped link; the next welcome
        // repopulates them.
        *self.capabilities.lock() = None;

        let failed: Vec<PendingCall> = {
            let mut pending = self.pending.lock();
            let in_flight: Vec<CorrelationId> = pending
                .keys()
                .copied()
                .filter(|id| !queued_ids.contains(id))
                .collect();
            in_flight
                .into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };

        let count = failed.len();
        for call in failed {
            let _ = call.tx.send(Err(Error::Disconnected));
        }

        if count > 0 {
            debug!(count, "Failed in-flight calls on disconnect");
        }
    }

    /// Resolves one pending call with an error, if still pending.
    fn fail_pending(&self, correlation_id: CorrelationId, error: Error) {
        if let Some(call) = self.pending.lock().remove(&correlation_id) {
            debug!(
                %correlation_id,
                age_ms = call.issued.elapsed().as_millis() as u64,
                error = %error,
                "Pending call failed"
            );
            let _ = call.tx.send(Err(error));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Error for a reply whose kind does not match its command.
fn unexpected_reply(expected: &str, reply: &Reply) -> Error {
    Error::protocol(format!(
        "expected {expected}-response, got {}",
        reply.kind()
    ))
}

// ============================================================================
// Tests
// ============================================================================
