//! Resilient connection client
//!
//! This crate provides [`ResilientClient`], a connection handle that keeps a
//! logical connection alive on top of any transport implementing
//! [`resock_core::TransportAdapter`]. It includes:
//!
//! - **Deduplicated operations**: concurrent opens share one attempt,
//!   concurrent closes share one close
//! - **Bounded waits**: open and close timeouts
//! - **Auto-reopen**: a once-a-second supervisor replaces the transport when
//!   it closes or goes quiet past the keep-alive timeout, throttled
//! - **Fan-out**: messages and lifecycle events as handlers or streams
//! - **Observability**: OpenTelemetry metrics and tracing spans
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resock_client::ClientBuilder;
//! use std::time::Duration;
//! # use resock_core::TransportFactory;
//!
//! # async fn example(factory: impl TransportFactory) -> resock_core::Result<()> {
//! let client = ClientBuilder::new(factory)
//!     .keep_alive_timeout(Duration::from_secs(30))
//!     .auto_reopen_on_keep_alive_timeout(true)
//!     .auto_reopen_on_closed(true)
//!     .build()?;
//!
//! client.on_message(|message| async move {
//!     println!("Received: {}", message);
//! });
//!
//! client.open().await?;
//! client.send_text("subscribe:ticker").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod config;
mod connection_state;
mod distributor;
mod metrics;
mod supervisor;

pub use client::{ResilientClient, NORMAL_CLOSURE_REASON};
pub use client_builder::ClientBuilder;
pub use config::ClientConfig;
pub use distributor::{BroadcastStream, EventStream, MessageStream, Subscription};
pub use metrics::ClientMetrics;
pub use supervisor::{ReopenReason, TICK_INTERVAL};

pub use resock_core::{
    CloseCode, ConnectionState, Error, LifecycleEvent, Message, Result, TextEncoding,
};
