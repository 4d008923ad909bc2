//! End-to-end tests against a local WebSocket server
//!
//! These run in real time: the reopen supervisor ticks once per second.

mod common;

use common::MockWsServer;
use futures::StreamExt;
use resock_client::{
    ClientBuilder, CloseCode, ConnectionState, Error, EventStream, LifecycleEvent, Message,
    ResilientClient,
};
use resock_tungstenite::TungsteniteFactory;
use std::time::Duration;
use tokio::sync::mpsc;

async fn next_matching(
    events: &mut EventStream,
    within: Duration,
    predicate: impl Fn(&LifecycleEvent) -> bool,
) -> Option<LifecycleEvent> {
    tokio::time::timeout(within, async {
        while let Some(event) = events.next().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

fn client_for(server: &MockWsServer) -> ClientBuilder {
    ClientBuilder::new(TungsteniteFactory::new(server.url()))
        .open_timeout(Duration::from_secs(2))
        .close_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_echo_reaches_every_subscriber_once() {
    let mut server = MockWsServer::new().await;
    let client = client_for(&server).open().await.unwrap();

    let (tx, mut handled) = mpsc::unbounded_channel();
    client.on_message(move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message);
        }
    });
    let mut stream = client.messages();
    let opened_at = client.last_received();

    client.send_text("hello").await.unwrap();
    assert_eq!(server.wait_for_message().await.as_deref(), Some("hello"));

    let streamed = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap();
    assert_eq!(streamed, Some(Message::text("hello")));
    let delivered = tokio::time::timeout(Duration::from_secs(2), handled.recv())
        .await
        .unwrap();
    assert_eq!(delivered, Some(Message::text("hello")));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(stream.try_next().is_none());
    assert!(handled.try_recv().is_err());
    assert!(client.last_received() >= opened_at);

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_binary_round_trip() {
    let server = MockWsServer::new().await;
    let client = client_for(&server).open().await.unwrap();
    let mut stream = client.messages();

    client.send_binary(vec![0u8, 1, 2]).await.unwrap();
    // The mock server only echoes text
    client.send_text("after-binary").await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap();
    assert_eq!(next, Some(Message::text("after-binary")));

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_close_handshake() {
    let server = MockWsServer::new().await;
    let client = client_for(&server).open().await.unwrap();
    let mut events = client.events();

    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);

    let closing = next_matching(&mut events, Duration::from_secs(1), |e| {
        matches!(e, LifecycleEvent::Closing)
    })
    .await;
    assert!(closing.is_some());
    match next_matching(&mut events, Duration::from_secs(1), |e| {
        matches!(e, LifecycleEvent::Closed { .. })
    })
    .await
    {
        Some(LifecycleEvent::Closed { code, reason }) => {
            assert_eq!(code, CloseCode::NORMAL);
            assert_eq!(reason.as_deref(), Some("Normal closure"));
        }
        other => panic!("expected Closed, got {:?}", other),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_server_close_is_reported() {
    let server = MockWsServer::new().await;
    let client = client_for(&server).open().await.unwrap();
    let mut events = client.events();

    server.close_sessions(1001, "maintenance");

    match next_matching(&mut events, Duration::from_secs(2), |e| {
        matches!(e, LifecycleEvent::Error(_))
    })
    .await
    {
        Some(LifecycleEvent::Error(Error::UnexpectedClose { code, .. })) => {
            assert_eq!(code, CloseCode::AWAY);
        }
        other => panic!("expected UnexpectedClose, got {:?}", other),
    }
    match next_matching(&mut events, Duration::from_secs(1), |e| {
        matches!(e, LifecycleEvent::Closed { .. })
    })
    .await
    {
        Some(LifecycleEvent::Closed { code, reason }) => {
            assert_eq!(code, CloseCode::AWAY);
            assert_eq!(reason.as_deref(), Some("maintenance"));
        }
        other => panic!("expected Closed, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Closed);

    // No auto-reopen configured
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(server.connections(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_reopen_after_server_close() {
    let server = MockWsServer::new().await;
    let client = client_for(&server)
        .auto_reopen_on_closed(true)
        .auto_reopen_throttle(Duration::ZERO)
        .open()
        .await
        .unwrap();
    let mut events = client.events();

    server.close_sessions(1001, "restart");

    let reopened = next_matching(&mut events, Duration::from_secs(5), |e| {
        matches!(e, LifecycleEvent::Reopened)
    })
    .await;
    assert!(reopened.is_some());
    assert!(client.is_open());
    assert_eq!(server.connections(), 2);

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_reopen_after_dropped_session() {
    let server = MockWsServer::new().await;
    let client = client_for(&server)
        .auto_reopen_on_closed(true)
        .auto_reopen_throttle(Duration::ZERO)
        .open()
        .await
        .unwrap();
    let mut events = client.events();

    server.drop_sessions();

    let reopened = next_matching(&mut events, Duration::from_secs(5), |e| {
        matches!(e, LifecycleEvent::Reopened)
    })
    .await;
    assert!(reopened.is_some());
    assert!(server.wait_for_connections(2, Duration::from_secs(1)).await);

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_keep_alive_timeout_reopens_silent_connection() {
    let server = MockWsServer::silent().await;
    let client = client_for(&server)
        .keep_alive_timeout(Duration::from_secs(1))
        .auto_reopen_on_keep_alive_timeout(true)
        .auto_reopen_throttle(Duration::ZERO)
        .open()
        .await
        .unwrap();
    let mut events = client.events();

    let reopened = next_matching(&mut events, Duration::from_secs(5), |e| {
        matches!(e, LifecycleEvent::Reopened)
    })
    .await;
    assert!(reopened.is_some());
    assert!(server.connections() >= 2);

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_pushed_frames_keep_connection_alive() {
    let server = MockWsServer::silent().await;
    let client = client_for(&server)
        .keep_alive_timeout(Duration::from_millis(1500))
        .auto_reopen_on_keep_alive_timeout(true)
        .open()
        .await
        .unwrap();

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        server.push("tick");
    }

    assert!(client.is_open());
    assert_eq!(server.connections(), 1);

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_open_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let client: ResilientClient = ClientBuilder::new(TungsteniteFactory::new(url))
        .open_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let result = client.open().await;
    assert!(matches!(result, Err(Error::ConnectFailure(_))));
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_invalid_header_fails_open() {
    let server = MockWsServer::new().await;
    let factory = TungsteniteFactory::new(server.url()).with_header("bad header", "x");
    let client = ClientBuilder::new(factory).build().unwrap();

    let result = client.open().await;
    assert!(matches!(result, Err(Error::ConnectFailure(_))));

    server.shutdown().await;
}
