//! Transport adapter contract
//!
//! The resilient client never touches sockets. It drives a
//! [`TransportAdapter`] created by a [`TransportFactory`] once per connection
//! attempt, and receives the adapter's notifications through a
//! [`TransportListener`].
//!
//! # Contract
//!
//! - `open()` leaves the adapter open or returns an error. It never returns
//!   `Ok` in a non-open state and never swallows a failure.
//! - `ensure_close()` never fails and is idempotent: concurrent or repeated
//!   calls await the same close, and a close requested while an open is in
//!   flight aborts that open.
//! - `Closed` is notified only for unsolicited closure. A close the caller
//!   asked for is reported through the return of `ensure_close()` alone.
//! - Notifications go to exactly one listener per instance.
//!
//! Most adapters should not implement these traits directly but supply a
//! [`SocketDriver`](crate::SocketDriver) to [`GuardedTransport`](crate::GuardedTransport),
//! which implements the guarantees above once for every technology.

use crate::error::TransportError;
use crate::event::CloseCode;
use crate::message::{Message, TextEncoding};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A single connection attempt to a remote peer
#[async_trait]
pub trait TransportAdapter: Send + Sync + 'static {
    /// Open the connection
    ///
    /// Dropping the returned future aborts the handshake.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the connection gracefully, aborting it once `deadline` elapses
    async fn ensure_close(&self, code: CloseCode, reason: &str, deadline: Duration);

    /// Send one message
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Tear the connection down immediately without a close handshake
    ///
    /// No notification is raised for an aborted instance.
    fn abort(&self);

    /// True while the connection is open
    fn is_open(&self) -> bool;
}

/// Notification raised by a transport instance
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound message
    Message(Message),
    /// The connection was closed without the caller asking for it
    Closed {
        /// Close code from the peer, `NO_STATUS` when none was sent
        code: CloseCode,
        /// Close reason from the peer, if any
        reason: Option<String>,
    },
    /// A failure outside of any caller operation
    Error(TransportError),
}

/// Listener verdict on a delivered notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The instance is still the active one
    Accepted,
    /// The instance has been replaced; it must tear itself down and stop
    /// delivering notifications
    Stale,
}

/// Recipient of a transport instance's notifications
pub trait TransportListener: Send + Sync + 'static {
    /// Handle one notification
    ///
    /// Called from the instance's receive loop. Implementations must not block.
    fn on_event(&self, event: TransportEvent) -> Delivery;
}

/// Creates a fresh transport instance per connection attempt
pub trait TransportFactory: Send + Sync + 'static {
    /// Build an unopened instance whose notifications go to `listener`
    fn create(
        &self,
        listener: Arc<dyn TransportListener>,
        encoding: TextEncoding,
    ) -> Arc<dyn TransportAdapter>;
}

impl<F> TransportFactory for F
where
    F: Fn(Arc<dyn TransportListener>, TextEncoding) -> Arc<dyn TransportAdapter>
        + Send
        + Sync
        + 'static,
{
    fn create(
        &self,
        listener: Arc<dyn TransportListener>,
        encoding: TextEncoding,
    ) -> Arc<dyn TransportAdapter> {
        self(listener, encoding)
    }
}
