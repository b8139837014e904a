//! Connection registry and accept loop.
//!
//! Tracks every attached controller, owns each transport for its lifetime,
//! and routes inbound frames to the dispatcher.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │          ConnectionRegistry              │
//! │          (single port)                   │
//! │  ┌────────────────────────────────────┐  │
//! │  │ conn-1 → writer task + read loop   │  │
//! │  │ conn-2 → writer task + read loop   │  │
//! │  └────────────────────────────────────┘  │
//! │                 │                        │
//! │                 ▼                        │
//! │          Dispatcher (shared)             │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Writes to one connection go through a single writer task fed by a
//! channel, so frames never interleave. Each inbound command is dispatched
//! on its own spawned task, but the read loop waits for each engine call
//! to start before dispatching the next frame, so calls reach the engine
//! in frame order while completions stay concurrent.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::to_string;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::executor::dispatcher::Dispatcher;
use crate::identifiers::ConnectionId;
use crate::protocol::{Reply, ReplyEnvelope};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ============================================================================
// LinkState
// ============================================================================

/// Lifecycle of one connection: only `Open` accepts and answers frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    /// Accepting and answering envelopes.
    Open,
    /// Close initiated; inbound frames are discarded.
    Closing,
    /// Transport released.
    Closed,
}

// ============================================================================
// ConnectionHandle
// ============================================================================

/// Registry-side handle for one live transport session.
///
/// The handle is the only entity permitted to write to the transport, and
/// it does so through the connection's single writer task.
#[derive(Clone)]
struct ConnectionHandle {
    /// Unique, never-reused identifier.
    id: ConnectionId,
    /// Feed into the writer task.
    outbound: mpsc::UnboundedSender<Message>,
    /// Current lifecycle state.
    state: Arc<Mutex<LinkState>>,
}

impl ConnectionHandle {
    fn is_open(&self) -> bool {
        *self.state.lock() == LinkState::Open
    }

    /// Initiates close: stop answering frames and ask the peer to close.
    fn begin_close(&self) {
        let mut state = self.state.lock();
        if *state == LinkState::Open {
            *state = LinkState::Closing;
            let _ = self.outbound.send(Message::Close(None));
        }
    }
}

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Tracks all currently attached controllers and dispatches their
/// commands.
///
/// An explicit instance owned by the server's lifecycle; pass the `Arc`
/// wherever introspection is needed. There is no process-wide singleton.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Arc::new(Dispatcher::new(engine));
/// let registry = ConnectionRegistry::bind_local(dispatcher).await?;
/// println!("executor listening on {}", registry.ws_url());
/// ```
pub struct ConnectionRegistry {
    /// WebSocket server port.
    port: u16,

    /// Shared command dispatcher.
    dispatcher: Arc<Dispatcher>,

    /// Active connections by id.
    connections: RwLock<FxHashMap<ConnectionId, ConnectionHandle>>,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// ConnectionRegistry - Constructor
// ============================================================================

impl ConnectionRegistry {
    /// Binds to `localhost:0` (random available port) and starts the
    /// accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_local(dispatcher: Arc<Dispatcher>) -> Result<Arc<Self>> {
        Self::bind(DEFAULT_BIND_IP, 0, dispatcher).await
    }

    /// Binds to a specific IP and port and starts the accept loop.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16, dispatcher: Arc<Dispatcher>) -> Result<Arc<Self>> {
        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        debug!(port = actual_port, "Registry bound");

        let registry = Arc::new(Self {
            port: actual_port,
            dispatcher,
            connections: RwLock::new(FxHashMap::default()),
            shutdown: AtomicBool::new(false),
        });

        let registry_clone = Arc::clone(&registry);
        tokio::spawn(async move {
            registry_clone.accept_loop(listener).await;
        });

        info!(port = actual_port, "Registry started");

        Ok(registry)
    }
}

// ============================================================================
// ConnectionRegistry - Introspection
// ============================================================================

impl ConnectionRegistry {
    /// Returns the WebSocket URL controllers should connect to.
    ///
    /// Format: `ws://127.0.0.1:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns the port the registry is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the number of active connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns the ids of all active connections.
    ///
    /// Used by health endpoints; not required for command flow.
    #[must_use]
    pub fn list_active(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().copied().collect()
    }

    /// Sends a reply envelope to every open connection.
    ///
    /// Returns the number of connections the envelope was queued for.
    pub fn broadcast(&self, envelope: &ReplyEnvelope) -> Result<usize> {
        let json = to_string(envelope)?;

        let connections = self.connections.read();
        let mut sent = 0;
        for handle in connections.values() {
            if handle.is_open() && handle.outbound.send(Message::Text(json.clone().into())).is_ok()
            {
                sent += 1;
            }
        }
        Ok(sent)
    }
}

// ============================================================================
// ConnectionRegistry - Lifecycle
// ============================================================================

impl ConnectionRegistry {
    /// Removes a connection and releases its transport.
    ///
    /// Safe to call more than once; only the first call acts.
    pub fn remove(&self, id: ConnectionId) {
        let removed = {
            let mut connections = self.connections.write();
            connections.remove(&id)
        };

        if let Some(handle) = removed {
            handle.begin_close();
            debug!(id = %handle.id, "Connection removed from registry");
        }
    }

    /// Shuts down the registry: stops accepting and closes every
    /// connection.
    pub fn shutdown(&self) {
        info!("Registry shutting down");

        self.shutdown.store(true, Ordering::SeqCst);

        let connections: Vec<_> = {
            let mut map = self.connections.write();
            map.drain().collect()
        };

        for (id, handle) in connections {
            handle.begin_close();
            debug!(%id, "Connection closed during shutdown");
        }
    }
}

// ============================================================================
// ConnectionRegistry - Accept Loop
// ============================================================================

impl ConnectionRegistry {
    /// Background task that accepts new controller connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking the shutdown flag.
            match timeout(Duration::from_millis(100), listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let registry = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = registry.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => {
                    continue;
                }
            }
        }

        debug!("Accept loop terminated");
    }

    /// Runs one accepted connection to completion.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let id = ConnectionId::next();
        let (ws_write, mut ws_read) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(LinkState::Open));

        let handle = ConnectionHandle {
            id,
            outbound: outbound_tx,
            state: Arc::clone(&state),
        };

        tokio::spawn(Self::write_loop(outbound_rx, ws_write, Arc::clone(&state)));

        // Capability negotiation: welcome is the first frame on the wire.
        let welcome = ReplyEnvelope::uncorrelated(Reply::Welcome {
            capabilities: self.dispatcher.capabilities(),
        });
        let json = to_string(&welcome)?;
        handle
            .outbound
            .send(Message::Text(json.into()))
            .map_err(|_| Error::Disconnected)?;

        {
            let mut connections = self.connections.write();
            connections.insert(id, handle.clone());
        }

        info!(%id, ?addr, "Controller attached");

        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if !handle.is_open() {
                        debug!(%id, "Frame discarded on non-open connection");
                        continue;
                    }

                    // Dispatch on its own task so one slow engine call
                    // never stalls replies on this connection or others.
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let reply_handle = handle.clone();
                    let (issued_tx, issued_rx) = oneshot::channel();
                    tokio::spawn(async move {
                        let reply = dispatcher.dispatch_tracked(&text, issued_tx).await;
                        if !reply_handle.is_open() {
                            return;
                        }
                        match to_string(&reply) {
                            Ok(json) => {
                                let _ = reply_handle.outbound.send(Message::Text(json.into()));
                            }
                            Err(e) => warn!(error = %e, "Failed to serialize reply"),
                        }
                    });

                    // Hold the read loop until this frame's engine call has
                    // started, so calls reach the engine in frame order.
                    let _ = issued_rx.await;
                }

                Ok(Message::Close(_)) => {
                    debug!(%id, "WebSocket closed by controller");
                    break;
                }

                Err(e) => {
                    error!(%id, error = %e, "WebSocket error");
                    break;
                }

                // Ignore Binary, Ping, Pong
                _ => {}
            }
        }

        self.remove(id);
        Ok(())
    }

    /// Single writer per connection: drains the outbound channel into the
    /// sink so frames never interleave.
    async fn write_loop(
        mut outbound_rx: mpsc::UnboundedReceiver<Message>,
        mut ws_write: SplitSink<WebSocketStream<TcpStream>, Message>,
        state: Arc<Mutex<LinkState>>,
    ) {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = ws_write.send(message).await {
                debug!(error = %e, "Write failed, closing connection");
                break;
            }
            if closing {
                break;
            }
        }

        let _ = ws_write.close().await;
        *state.lock() = LinkState::Closed;
        debug!("Writer terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
