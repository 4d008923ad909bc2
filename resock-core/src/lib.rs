//! Core types and transport contract for resock
//!
//! This crate holds everything the resilient client and the concrete
//! transports agree on:
//!
//! - **Data model**: [`Message`], [`ConnectionState`], [`CloseCode`], [`LifecycleEvent`]
//! - **Errors**: the client-facing [`Error`] and the adapter-facing [`TransportError`]
//! - **Transport contract**: [`TransportAdapter`], [`TransportListener`], [`TransportFactory`]
//! - **Guarded base layer**: [`GuardedTransport`], which implements the contract on
//!   top of a technology-specific [`SocketDriver`]
//! - **Observability**: OpenTelemetry and `tracing` bootstrap
//!
//! # Architecture
//!
//! ```text
//! ResilientClient ──drives──> Arc<dyn TransportAdapter>
//!        ^                              │
//!        └──── TransportListener <──────┘  (message / closed / error)
//! ```
//!
//! The client never inspects a transport beyond asking whether the instance
//! delivering a notification is still the active one. Socket I/O, framing and
//! handshakes live entirely behind [`SocketDriver`].
//!
//! # Example
//!
//! ```rust
//! use resock_core::{CloseCode, Message, TextEncoding};
//!
//! let message = Message::text("hello");
//! assert_eq!(message.as_text(), Some("hello"));
//! assert_eq!(CloseCode::NORMAL.as_u16(), 1000);
//! assert_eq!(TextEncoding::default(), TextEncoding::Utf8);
//! ```

pub mod error;
pub mod event;
pub mod guarded;
pub mod message;
pub mod observability;
pub mod state;
pub mod transport;

pub use error::{Error, Result, TransportError};
pub use event::{CloseCode, LifecycleEvent};
pub use guarded::{GuardedTransport, Inbound, SocketDriver};
pub use message::{Message, TextEncoding};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use state::{AtomicConnectionState, ConnectionState};
pub use transport::{Delivery, TransportAdapter, TransportEvent, TransportFactory, TransportListener};
