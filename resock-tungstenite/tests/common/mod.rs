//! Common test utilities for resock-tungstenite integration tests
//!
//! This module provides a mock WebSocket server that echoes text frames and
//! lets a test push frames, close sessions with a close frame, or drop them
//! without one.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    Close(u16, String),
    Drop,
}

/// Mock WebSocket server for client testing
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    control_tx: broadcast::Sender<Control>,
    message_rx: mpsc::Receiver<String>,
    connections: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a server that echoes every text frame back
    pub async fn new() -> Self {
        Self::start(true).await
    }

    /// Start a server that records text frames without answering
    pub async fn silent() -> Self {
        Self::start(false).await
    }

    async fn start(echo: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, message_rx) = mpsc::channel::<String>(100);
        let (control_tx, _) = broadcast::channel::<Control>(16);
        let connections = Arc::new(AtomicUsize::new(0));

        let control = control_tx.clone();
        let accepted = connections.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let msg_tx = msg_tx.clone();
                        let mut control_rx = control.subscribe();
                        accepted.fetch_add(1, Ordering::SeqCst);

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();

                            loop {
                                tokio::select! {
                                    incoming = read.next() => match incoming {
                                        Some(Ok(Message::Text(text))) => {
                                            let _ = msg_tx.send(text.clone()).await;
                                            if echo {
                                                let _ = write.send(Message::Text(text)).await;
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                        Some(Ok(_)) => {}
                                    },
                                    command = control_rx.recv() => match command {
                                        Ok(Control::Push(text)) => {
                                            let _ = write.send(Message::Text(text)).await;
                                        }
                                        Ok(Control::Close(code, reason)) => {
                                            let frame = CloseFrame {
                                                code: code.into(),
                                                reason: Cow::Owned(reason),
                                            };
                                            let _ = write.send(Message::Close(Some(frame))).await;
                                        }
                                        Ok(Control::Drop) | Err(_) => break,
                                    },
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            control_tx,
            message_rx,
            connections,
        }
    }

    /// Get the WebSocket URL for connecting to this server
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Send a text frame on every live session
    pub fn push(&self, text: &str) {
        let _ = self.control_tx.send(Control::Push(text.to_string()));
    }

    /// Close every live session with a close frame
    pub fn close_sessions(&self, code: u16, reason: &str) {
        let _ = self.control_tx.send(Control::Close(code, reason.to_string()));
    }

    /// Drop every live session without a close frame
    pub fn drop_sessions(&self) {
        let _ = self.control_tx.send(Control::Drop);
    }

    /// Wait for a text frame to be received by the server
    ///
    /// Returns None if the timeout expires.
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait until at least `count` connections were accepted
    pub async fn wait_for_connections(&self, count: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.connections() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.connections() >= count
    }

    /// Shutdown the mock server
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        self.drop_sessions();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
