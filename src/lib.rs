//! resock - Resilient WebSocket connections
//!
//! This is the main convenience crate that re-exports all resock sub-crates.
//! Use this crate if you want a single dependency that provides the client
//! together with the tokio-tungstenite transport.
//!
//! # Architecture
//!
//! resock is organized into modular crates:
//!
//! - **resock-core**: Core types, error handling, transport contract, observability
//! - **resock-client**: Connection state machine, reopen supervisor, fan-out
//! - **resock-tungstenite**: WebSocket transport built on tokio-tungstenite
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = resock::websocket("ws://localhost:8080")
//!         .keep_alive_timeout(Duration::from_secs(30))
//!         .auto_reopen_on_keep_alive_timeout(true)
//!         .auto_reopen_on_closed(true)
//!         .build()?;
//!
//!     client.on_message(|message| async move {
//!         println!("Received: {}", message);
//!     });
//!
//!     client.open().await?;
//!     client.send_text("hello").await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Transports
//!
//! Anything implementing [`core::TransportFactory`] can back a client. Socket
//! technologies usually implement [`core::SocketDriver`] and wrap it in
//! [`core::GuardedTransport`], which supplies the transport guarantees.

pub use resock_client as client;
pub use resock_core as core;
pub use resock_tungstenite as tungstenite;

pub use resock_client::{
    ClientBuilder, ClientConfig, ConnectionState, LifecycleEvent, Message, ResilientClient,
};
pub use resock_core::{Error, Result};
pub use resock_tungstenite::TungsteniteFactory;

/// Start building a client for a `ws://` or `wss://` URL
pub fn websocket(url: impl Into<String>) -> ClientBuilder {
    ClientBuilder::new(TungsteniteFactory::new(url))
}
