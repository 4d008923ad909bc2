//! Plain WebSocket echo server for the client demos
//!
//! Echoes every text and binary frame back. Typing `close` or `drop` on
//! stdin ends every session with a close frame or by dropping the socket,
//! which lets you watch the client reopen.
//!
//! ```bash
//! cargo run --example echo_server
//! ```

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy)]
enum Command {
    Close,
    Drop,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:9010").await?;
    println!("Echo server listening on ws://127.0.0.1:9010");
    println!("Type 'close' or 'drop' to end all sessions\n");

    let (commands, _) = broadcast::channel::<Command>(8);

    let stdin_commands = commands.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "close" => Command::Close,
                "drop" => Command::Drop,
                _ => continue,
            };
            let _ = stdin_commands.send(command);
        }
    });

    loop {
        let (stream, peer) = listener.accept().await?;
        let mut commands = commands.subscribe();

        tokio::spawn(async move {
            let ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    eprintln!("[{}] handshake failed: {}", peer, e);
                    return;
                }
            };
            println!("[{}] connected", peer);
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    incoming = read.next() => match incoming {
                        Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                            if write.send(message).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            println!("[{}] client closed: {:?}", peer, frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    },
                    command = commands.recv() => match command {
                        Ok(Command::Close) => {
                            let frame = CloseFrame {
                                code: CloseCode::Away,
                                reason: "server going away".into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                        }
                        Ok(Command::Drop) | Err(_) => break,
                    },
                }
            }
            println!("[{}] session ended", peer);
        });
    }
}
