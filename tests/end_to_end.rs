//! In-process controller/executor tests over real WebSocket connections.
//!
//! Each test binds a registry on a random localhost port, points a
//! controller client (or a raw socket) at it, and checks the protocol's
//! observable laws: correlation, FIFO flush, error isolation, disconnect
//! semantics, and timeout independence.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use browser_relay::{
    ClientConfig, Command, CommandEnvelope, ConnectionRegistry, ControllerClient, Dispatcher,
    EngineCall, Error, Reply, ReplyEnvelope, ScriptedEngine,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn start_executor(engine: ScriptedEngine) -> (Arc<ConnectionRegistry>, Arc<ScriptedEngine>) {
    init_tracing();
    let engine = Arc::new(engine);
    let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
    let registry = ConnectionRegistry::bind_local(dispatcher)
        .await
        .expect("registry bind");
    (registry, engine)
}

#[tokio::test]
async fn correlation_round_trip() {
    let (registry, _engine) = start_executor(ScriptedEngine::new()).await;
    let client = ControllerClient::new();
    client.connect(&registry.ws_url()).await.expect("connect");

    let url = client.navigate("https://example.com").await.expect("navigate");
    assert_eq!(url, "https://example.com");

    let element = client.click("#submit").await.expect("click");
    assert_eq!(element, "<#submit>");

    let text = client.type_text("#q", "rust").await.expect("type");
    assert_eq!(text, "rust");

    let filename = client.screenshot("landing").await.expect("screenshot");
    assert_eq!(filename, "landing.png");

    assert_eq!(client.pending_count(), 0);

    client.disconnect();
    registry.shutdown();
}

#[tokio::test]
async fn welcome_announces_capabilities() {
    let (registry, _engine) = start_executor(ScriptedEngine::new()).await;
    let client = ControllerClient::new();
    client.connect(&registry.ws_url()).await.expect("connect");

    // The welcome frame arrives right after the handshake; give the
    // receive loop a moment to record it.
    let mut capabilities = None;
    for _ in 0..50 {
        capabilities = client.capabilities();
        if capabilities.is_some() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(
        capabilities.expect("welcome received"),
        vec!["navigate", "screenshot", "click", "type"]
    );

    // Capabilities belong to the link: dropping it forgets them.
    client.disconnect();
    assert!(client.capabilities().is_none());

    registry.shutdown();
}

#[tokio::test]
async fn queued_commands_flush_in_fifo_order() {
    let (registry, engine) = start_executor(ScriptedEngine::new()).await;
    let client = ControllerClient::new();
    let url = registry.ws_url();

    // Connect only after all three commands are sitting in the queue.
    let connector = client.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(150)).await;
        connector.connect(&url).await.expect("connect");
    });

    // join! polls in declaration order, so the queue holds a, b, c.
    let (a, b, c) = tokio::join!(
        client.navigate("https://a.example"),
        client.navigate("https://b.example"),
        client.navigate("https://c.example"),
    );
    a.expect("a");
    b.expect("b");
    c.expect("c");

    assert_eq!(
        engine.calls(),
        vec![
            EngineCall::Navigate("https://a.example".to_string()),
            EngineCall::Navigate("https://b.example".to_string()),
            EngineCall::Navigate("https://c.example".to_string()),
        ]
    );

    client.disconnect();
    registry.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn flushed_commands_keep_order_across_worker_threads() {
    let (registry, engine) = start_executor(ScriptedEngine::new()).await;
    let client = ControllerClient::new();
    let url = registry.ws_url();

    let connector = client.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(150)).await;
        connector.connect(&url).await.expect("connect");
    });

    // join! polls in declaration order, so the queue holds a through e.
    // On a multi-thread runtime the executor must still start the engine
    // calls in that order even though each handler runs on its own task.
    let (a, b, c, d, e) = tokio::join!(
        client.navigate("https://a.example"),
        client.navigate("https://b.example"),
        client.navigate("https://c.example"),
        client.navigate("https://d.example"),
        client.navigate("https://e.example"),
    );
    a.expect("a");
    b.expect("b");
    c.expect("c");
    d.expect("d");
    e.expect("e");

    assert_eq!(
        engine.calls(),
        vec![
            EngineCall::Navigate("https://a.example".to_string()),
            EngineCall::Navigate("https://b.example".to_string()),
            EngineCall::Navigate("https://c.example".to_string()),
            EngineCall::Navigate("https://d.example".to_string()),
            EngineCall::Navigate("https://e.example".to_string()),
        ]
    );

    client.disconnect();
    registry.shutdown();
}

#[tokio::test]
async fn unknown_kind_gets_error_and_connection_survives() {
    let (registry, _engine) = start_executor(ScriptedEngine::new()).await;

    let (mut socket, _) = connect_async(registry.ws_url()).await.expect("connect");

    // First frame is the welcome.
    let welcome = recv_reply(&mut socket).await;
    assert!(matches!(welcome.reply, Reply::Welcome { .. }));

    // An unknown kind yields an error reply with the id echoed...
    let bogus_id = browser_relay::CorrelationId::generate();
    let bogus = format!(r##"{{"correlationId":"{bogus_id}","kind":"hover","selector":"#x"}}"##);
    socket.send(Message::Text(bogus.into())).await.expect("send");

    let reply = recv_reply(&mut socket).await;
    assert_eq!(reply.correlation_id, Some(bogus_id));
    match &reply.reply {
        Reply::Error { error } => assert!(error.contains("hover")),
        other => panic!("expected error reply, got {other:?}"),
    }

    // ...and the same connection still executes a valid command.
    let envelope = CommandEnvelope::new(Command::Navigate {
        url: "https://still.alive".to_string(),
    });
    let json = serde_json::to_string(&envelope).expect("serialize");
    socket.send(Message::Text(json.into())).await.expect("send");

    let reply = recv_reply(&mut socket).await;
    assert_eq!(reply.correlation_id, Some(envelope.correlation_id));
    assert!(matches!(
        reply.reply,
        Reply::NavigateResponse { success: true, .. }
    ));

    registry.shutdown();
}

#[tokio::test]
async fn disconnect_fails_every_pending_call() {
    let engine = ScriptedEngine::new().with_delay("navigate", Duration::from_secs(10));
    let (registry, _engine) = start_executor(engine).await;
    let client = ControllerClient::new();
    client.connect(&registry.ws_url()).await.expect("connect");

    let shutdown_registry = registry.clone();
    let (a, b, ()) = tokio::join!(
        client.navigate("https://a.example"),
        client.navigate("https://b.example"),
        async {
            // Let both commands reach the executor, then drop the link.
            sleep(Duration::from_millis(200)).await;
            shutdown_registry.shutdown();
        },
    );

    assert!(matches!(a, Err(Error::Disconnected)));
    assert!(matches!(b, Err(Error::Disconnected)));

    // Exactly N calls resolved: nothing is left pending, and a late reply
    // has nothing to resolve against.
    assert_eq!(client.pending_count(), 0);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn concurrent_same_kind_commands_resolve_independently() {
    let engine = ScriptedEngine::new().with_delay("#a", Duration::from_millis(300));
    let (registry, _engine) = start_executor(engine).await;
    let client = ControllerClient::new();
    client.connect(&registry.ws_url()).await.expect("connect");

    // #b answers before #a; correlation must keep each call matched to
    // its own selector.
    let (a, b) = tokio::join!(client.click("#a"), client.click("#b"));
    assert_eq!(a.expect("click #a"), "<#a>");
    assert_eq!(b.expect("click #b"), "<#b>");

    client.disconnect();
    registry.shutdown();
}

#[tokio::test]
async fn slow_call_times_out_without_stalling_fast_call() {
    let engine = ScriptedEngine::new().with_delay("navigate", Duration::from_secs(2));
    let (registry, _engine) = start_executor(engine).await;

    let config = ClientConfig::default().with_command_timeout(Duration::from_millis(400));
    let client = ControllerClient::with_config(config);
    client.connect(&registry.ws_url()).await.expect("connect");

    let (slow, fast) = tokio::join!(
        client.navigate("https://slow.example"),
        client.click("#fast"),
    );

    assert!(matches!(slow, Err(Error::Timeout { .. })));
    assert_eq!(fast.expect("fast click"), "<#fast>");

    // The connection outlives the timed-out call.
    assert_eq!(client.click("#again").await.expect("click"), "<#again>");

    client.disconnect();
    registry.shutdown();
}

#[tokio::test]
async fn queue_survives_disconnect_for_retry() {
    let (registry, engine) = start_executor(ScriptedEngine::new()).await;
    let client = ControllerClient::new();
    let url = registry.ws_url();

    // Queue a command, connect midway so it flushes and resolves.
    let connector = client.clone();
    let reconnect_url = url.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        connector.connect(&reconnect_url).await.expect("connect");
    });

    client.navigate("https://first.example").await.expect("first");

    // Drop the link; in-flight state clears but the client stays usable.
    client.disconnect();
    assert!(!client.is_connected());

    client.connect(&url).await.expect("reconnect");
    client.navigate("https://second.example").await.expect("second");

    assert_eq!(
        engine.calls(),
        vec![
            EngineCall::Navigate("https://first.example".to_string()),
            EngineCall::Navigate("https://second.example".to_string()),
        ]
    );

    client.disconnect();
    registry.shutdown();
}

#[tokio::test]
async fn connect_times_out_when_executor_never_answers() {
    init_tracing();

    // Raw TCP listener that never completes the WebSocket handshake.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _socket = listener.accept().await;
        sleep(Duration::from_secs(10)).await;
    });

    let config = ClientConfig::default().with_connect_timeout(Duration::from_millis(200));
    let client = ControllerClient::with_config(config);

    let result = client.connect(&format!("ws://{addr}")).await;
    assert!(matches!(result, Err(Error::ConnectionTimeout { .. })));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn concurrent_connects_admit_exactly_one() {
    let (registry, _engine) = start_executor(ScriptedEngine::new()).await;
    let client = ControllerClient::new();
    let url = registry.ws_url();

    // Both handshakes race; exactly one may install the link.
    let (first, second) = tokio::join!(client.connect(&url), client.connect(&url));
    assert!(first.is_ok() != second.is_ok());
    assert!(client.is_connected());

    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser, Err(Error::Connection { .. })));

    // The surviving link works.
    assert_eq!(
        client.navigate("https://example.com").await.expect("navigate"),
        "https://example.com"
    );

    client.disconnect();
    registry.shutdown();
}

#[tokio::test]
async fn registry_tracks_attached_controllers() {
    let (registry, _engine) = start_executor(ScriptedEngine::new()).await;

    let first = ControllerClient::new();
    first.connect(&registry.ws_url()).await.expect("connect");
    let second = ControllerClient::new();
    second.connect(&registry.ws_url()).await.expect("connect");

    // Accept runs on the executor side; wait for both registrations.
    let mut count = 0;
    for _ in 0..50 {
        count = registry.connection_count();
        if count == 2 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(count, 2);
    assert_eq!(registry.list_active().len(), 2);

    first.disconnect();
    second.disconnect();
    registry.shutdown();
}

/// Reads frames until the next text frame and parses it as a reply.
async fn recv_reply<S>(socket: &mut S) -> ReplyEnvelope
where
    S: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("reply within 5s")
            .expect("stream open")
            .expect("frame ok");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("parse reply");
        }
    }
}
