//! Example demonstrating a resilient WebSocket client
//!
//! Opens a connection with auto-reopen enabled, prints every lifecycle
//! event and echoes a counter through the server.
//!
//! Run the server first:
//! ```bash
//! cargo run --example echo_server
//! ```
//!
//! Then run this client:
//! ```bash
//! cargo run --example echo_client
//! ```
//!
//! Type `close` or `drop` in the server terminal to see the client reopen.

use resock::LifecycleEvent;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("resock_client=debug,resock_core=debug,info")
        .init();

    let client = resock::websocket("ws://127.0.0.1:9010")
        .open_timeout(Duration::from_secs(5))
        .auto_reopen_on_closed(true)
        .auto_reopen_throttle(Duration::from_secs(3))
        .build()?;

    client.on_event(|event| async move {
        match event {
            LifecycleEvent::Error(e) => println!("✗ {}", e),
            LifecycleEvent::Closed { code, reason } => {
                println!("· closed ({}) {}", code, reason.unwrap_or_default())
            }
            other => println!("· {}", other.name()),
        }
    });
    client.on_message(|message| async move {
        println!("📩 {}", message);
    });

    client.open().await?;
    println!("✓ Connected\n");

    let mut counter = 1u64;
    loop {
        tokio::time::sleep(Duration::from_secs(2)).await;
        match client.send_text(format!("ping {}", counter)).await {
            Ok(()) => {}
            Err(e) => println!("[{}] not sent while {}: {}", counter, client.state(), e),
        }
        counter += 1;
    }
}
