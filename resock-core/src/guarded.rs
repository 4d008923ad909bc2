//! Shared base layer for transport adapters
//!
//! [`GuardedTransport`] turns a [`SocketDriver`], which only knows how to
//! connect, read, write and send a close frame, into a full
//! [`TransportAdapter`]. It owns everything that is the same for every
//! socket technology:
//!
//! - **Single-open reentrancy**: a second `open()` while one is in flight is
//!   rejected with `OpenInProgress` instead of being queued.
//! - **Idempotent close**: every `ensure_close()` call awaits one shared close
//!   future; a close requested while opening aborts the open.
//! - **Receive loop**: one task per open instance reads frames, decodes text
//!   and forwards notifications to the listener. When the listener reports
//!   the instance as stale, the loop tears the instance down and stops.
//! - **Solicited-close suppression**: once a close was requested, no `Closed`
//!   or `Error` notification is raised.
//! - **Error wrapping**: driver errors become [`TransportError`] variants
//!   matching the failed operation.
//!
//! Instances are single-use. After a close or an abort, `open()` returns
//! `TransportError::Cancelled`; the factory builds a new instance instead.

use crate::error::TransportError;
use crate::event::CloseCode;
use crate::message::{Message, TextEncoding};
use crate::transport::{Delivery, TransportAdapter, TransportEvent, TransportListener};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A frame read from the socket, before text decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Raw text frame payload
    Text(Vec<u8>),
    /// Binary frame payload
    Binary(Vec<u8>),
    /// Close frame from the peer
    Close {
        /// Code carried by the frame, if any
        code: Option<CloseCode>,
        /// Reason carried by the frame, if any
        reason: Option<String>,
    },
}

/// Technology-specific socket mechanics
///
/// The connection is split into a writer half, owned by the transport behind
/// a lock, and a reader half, owned by the receive loop. Dropping both halves
/// must release the socket.
#[async_trait]
pub trait SocketDriver: Send + Sync + 'static {
    /// Write half of a connected socket
    type Writer: Send + 'static;
    /// Read half of a connected socket
    type Reader: Send + 'static;
    /// Driver-native error
    type Error: std::fmt::Display + Send + 'static;

    /// Perform the handshake and split the socket
    async fn connect(&self) -> Result<(Self::Writer, Self::Reader), Self::Error>;

    /// Write one message
    async fn write(&self, writer: &mut Self::Writer, message: Message) -> Result<(), Self::Error>;

    /// Send a close frame
    async fn close(
        &self,
        writer: &mut Self::Writer,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), Self::Error>;

    /// Read the next data or close frame, `None` once the stream has ended
    ///
    /// Control frames other than close are handled inside the driver.
    async fn read(&self, reader: &mut Self::Reader) -> Option<Result<Inbound, Self::Error>>;
}

type CloseFuture = Shared<BoxFuture<'static, ()>>;

struct Inner<D: SocketDriver> {
    driver: D,
    listener: Arc<dyn TransportListener>,
    encoding: TextEncoding,
    opening: AtomicBool,
    open: AtomicBool,
    close_requested: AtomicBool,
    cancel: CancellationToken,
    writer: tokio::sync::Mutex<Option<D::Writer>>,
    receiver: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closing: parking_lot::Mutex<Option<CloseFuture>>,
}

impl<D: SocketDriver> Inner<D> {
    /// Drop the socket without a handshake and silence the instance
    fn teardown(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(handle) = self.receiver.lock().take() {
            handle.abort();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }

    fn deliver(&self, event: TransportEvent) -> Delivery {
        self.listener.on_event(event)
    }
}

/// Resets the opening flag when an open attempt ends, including by drop
struct OpeningGuard<'a>(&'a AtomicBool);

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// [`TransportAdapter`] built from a [`SocketDriver`]
pub struct GuardedTransport<D: SocketDriver> {
    inner: Arc<Inner<D>>,
}

impl<D: SocketDriver> GuardedTransport<D> {
    /// Wrap a driver; notifications go to `listener`
    pub fn new(driver: D, listener: Arc<dyn TransportListener>, encoding: TextEncoding) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                listener,
                encoding,
                opening: AtomicBool::new(false),
                open: AtomicBool::new(false),
                close_requested: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                writer: tokio::sync::Mutex::new(None),
                receiver: parking_lot::Mutex::new(None),
                closing: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// The wrapped driver
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }
}

impl<D: SocketDriver> Drop for GuardedTransport<D> {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

#[async_trait]
impl<D: SocketDriver> TransportAdapter for GuardedTransport<D> {
    async fn open(&self) -> Result<(), TransportError> {
        let inner = &self.inner;
        if inner.open.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyOpen);
        }
        if inner
            .opening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TransportError::OpenInProgress);
        }
        let _guard = OpeningGuard(&inner.opening);

        if inner.close_requested.load(Ordering::SeqCst) {
            return Err(TransportError::Cancelled);
        }

        let (writer, reader) = tokio::select! {
            _ = inner.cancel.cancelled() => return Err(TransportError::Cancelled),
            connected = inner.driver.connect() => connected.map_err(TransportError::connect)?,
        };

        {
            let mut slot = inner.writer.lock().await;
            if inner.cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            *slot = Some(writer);
        }

        inner.open.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(receive_loop(Arc::clone(inner), reader));
        *inner.receiver.lock() = Some(handle);

        if inner.cancel.is_cancelled() {
            inner.teardown();
            return Err(TransportError::Cancelled);
        }

        tracing::debug!("Transport opened");
        Ok(())
    }

    async fn ensure_close(&self, code: CloseCode, reason: &str, deadline: Duration) {
        let close = {
            let mut closing = self.inner.closing.lock();
            match closing.as_ref() {
                Some(close) => close.clone(),
                None => {
                    let close = close_session(Arc::clone(&self.inner), code, reason.to_string(), deadline)
                        .boxed()
                        .shared();
                    *closing = Some(close.clone());
                    close
                }
            }
        };
        close.await
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let inner = &self.inner;
        if !inner.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }

        let mut slot = inner.writer.lock().await;
        let result = match slot.as_mut() {
            Some(writer) => tokio::select! {
                _ = inner.cancel.cancelled() => Err(TransportError::Cancelled),
                written = inner.driver.write(writer, message) => written.map_err(TransportError::send),
            },
            None => Err(TransportError::NotOpen),
        };

        if inner.cancel.is_cancelled() {
            slot.take();
        }
        result
    }

    fn abort(&self) {
        if !self.inner.cancel.is_cancelled() {
            tracing::debug!("Transport aborted");
        }
        self.inner.teardown();
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }
}

async fn close_session<D: SocketDriver>(
    inner: Arc<Inner<D>>,
    code: CloseCode,
    reason: String,
    deadline: Duration,
) {
    inner.close_requested.store(true, Ordering::SeqCst);

    if inner.opening.load(Ordering::SeqCst) {
        tracing::debug!("Close requested while opening, aborting open");
        inner.teardown();
        return;
    }
    if !inner.open.swap(false, Ordering::SeqCst) {
        inner.teardown();
        return;
    }

    let graceful = async {
        {
            let mut slot = inner.writer.lock().await;
            if let Some(writer) = slot.as_mut() {
                if let Err(e) = inner.driver.close(writer, code, &reason).await {
                    tracing::debug!(error = %e, "Close frame not sent");
                    return;
                }
            }
        }
        // The receive loop ends once the peer answers the close frame
        let receiver = inner.receiver.lock().take();
        if let Some(receiver) = receiver {
            let _ = receiver.await;
        }
    };

    if tokio::time::timeout(deadline, graceful).await.is_err() {
        tracing::warn!(
            code = %code,
            deadline_ms = deadline.as_millis() as u64,
            "Close handshake timed out, aborting transport"
        );
    } else {
        tracing::debug!(code = %code, reason = %reason, "Transport closed");
    }
    inner.teardown();
}

async fn receive_loop<D: SocketDriver>(inner: Arc<Inner<D>>, mut reader: D::Reader) {
    let mut close_seen = false;

    loop {
        let next = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            next = inner.driver.read(&mut reader) => next,
        };

        let silenced = close_seen || inner.close_requested.load(Ordering::SeqCst);

        let event = match next {
            Some(Ok(Inbound::Text(bytes))) => match inner.encoding.decode(bytes) {
                Ok(text) => TransportEvent::Message(Message::Text(text)),
                Err(e) => {
                    if silenced {
                        continue;
                    }
                    TransportEvent::Error(e)
                }
            },
            Some(Ok(Inbound::Binary(data))) => TransportEvent::Message(Message::Binary(data)),
            Some(Ok(Inbound::Close { code, reason })) => {
                // Keep reading after the close frame so the driver can
                // flush its reply; the stream ends right after.
                close_seen = true;
                if silenced {
                    continue;
                }
                inner.open.store(false, Ordering::SeqCst);
                TransportEvent::Closed {
                    code: code.unwrap_or(CloseCode::NO_STATUS),
                    reason,
                }
            }
            Some(Err(e)) => {
                if silenced {
                    return;
                }
                inner.open.store(false, Ordering::SeqCst);
                let error = TransportError::receive(&e);
                tracing::debug!(error = %error, "Receive failed");
                if inner.deliver(TransportEvent::Error(error.clone())) == Delivery::Stale {
                    inner.teardown();
                    return;
                }
                inner.deliver(TransportEvent::Closed {
                    code: CloseCode::ABNORMAL,
                    reason: Some(error.to_string()),
                });
                inner.teardown();
                return;
            }
            None => {
                if !silenced {
                    inner.open.store(false, Ordering::SeqCst);
                    inner.deliver(TransportEvent::Closed {
                        code: CloseCode::NO_STATUS,
                        reason: None,
                    });
                }
                return;
            }
        };

        if inner.deliver(event) == Delivery::Stale {
            tracing::debug!("Receive loop belongs to a replaced transport, stopping");
            inner.teardown();
            return;
        }
    }
}
