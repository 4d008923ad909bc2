//! Example demonstrating keep-alive driven reopen
//!
//! The client expects traffic at least every 3 seconds. The echo server only
//! answers what it receives, so the client sends nothing for a while and
//! the supervisor reopens the quiet connection. Configuration is loaded from
//! JSON the way an application would embed it in its own settings file.
//!
//! ```bash
//! cargo run --example echo_server
//! cargo run --example keep_alive_reopen
//! ```

use resock::{ClientConfig, LifecycleEvent};
use std::time::Duration;

const CONFIG: &str = r#"{
    "open_timeout_ms": 5000,
    "close_timeout_ms": 2000,
    "keep_alive_timeout_ms": 3000,
    "auto_reopen_throttle_ms": 1000,
    "auto_reopen_on_keep_alive_timeout": true
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = ClientConfig::from_json(CONFIG)?;
    println!("Config: {:?}\n", config);

    let client = resock::websocket("ws://127.0.0.1:9010")
        .config(config)
        .open()
        .await?;

    let mut events = client.events();
    tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(event) = events.next().await {
            if let LifecycleEvent::Reopened = event {
                tracing::info!("connection reopened after silence");
            }
        }
    });

    println!("Quiet for 10 seconds, expect reopens every ~4 seconds");
    tokio::time::sleep(Duration::from_secs(10)).await;

    println!("\nChatty for 10 seconds, the connection should stay up");
    for n in 0..10 {
        client.send_text(format!("keep-alive {}", n)).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    client.close().await?;
    println!("\nClosed, state = {}", client.state());
    Ok(())
}
