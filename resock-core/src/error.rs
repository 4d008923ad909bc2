//! Error types for resock
//!
//! Two layers of errors exist, mirroring the two layers of the system:
//!
//! - **TransportError**: what a transport adapter reports. The guarded base
//!   layer wraps every driver-native failure into one of these variants, so
//!   the connection layer never sees a socket library's own error type.
//! - **Error**: what callers of the resilient client see. Connection-level
//!   failures wrap the originating `TransportError` as their source.
//!
//! Both types are `Clone`: concurrent callers of `open()`/`close()` await a
//! single in-flight outcome, and every one of them receives a copy of it.
//!
//! # Examples
//!
//! ```rust
//! use resock_core::{Error, TransportError};
//! use std::error::Error as _;
//!
//! let error = Error::ConnectFailure(TransportError::Connect("connection refused".into()));
//! assert!(error.is_connect_error());
//! assert!(error.source().is_some());
//! ```

use crate::event::CloseCode;
use std::time::Duration;
use thiserror::Error;

/// Result type for resock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the resilient client
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The open attempt did not complete within the configured open timeout
    #[error("Open timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The transport reported a failure while opening
    #[error("Open failed: {0}")]
    ConnectFailure(#[source] TransportError),

    /// The open attempt was cancelled before it completed
    ///
    /// Happens when `close()` is called while the connection is still
    /// connecting; every caller awaiting that open receives this error.
    #[error("Open cancelled")]
    ConnectCancelled,

    /// The transport reported a failure while sending
    #[error("Send failed: {0}")]
    SendFailure(#[source] TransportError),

    /// The caller-supplied send deadline elapsed
    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),

    /// The peer or the network closed an open connection
    #[error("Connection closed unexpectedly (code {code}): {}", reason.as_deref().unwrap_or("no reason"))]
    UnexpectedClose {
        /// Close code reported by the transport
        code: CloseCode,
        /// Close reason reported by the transport, if any
        reason: Option<String>,
    },

    /// The transport reported an error outside of any caller operation
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),

    /// The operation is not allowed in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// True for errors produced by a failed open attempt
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Error::ConnectTimeout(_) | Error::ConnectFailure(_) | Error::ConnectCancelled
        )
    }

    /// True when the open attempt was cancelled, either by timeout or by `close()`
    ///
    /// Faulted opens (the transport itself failed) return false.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::ConnectTimeout(_) | Error::ConnectCancelled)
    }
}

/// Errors reported by transport adapters
///
/// Drivers produce their own error types; the guarded base layer converts
/// them into the variant matching the operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Handshake or socket setup failed
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing a frame failed
    #[error("send failed: {0}")]
    Send(String),

    /// Reading from the socket failed
    #[error("receive failed: {0}")]
    Receive(String),

    /// The graceful close handshake failed
    #[error("close failed: {0}")]
    Close(String),

    /// An inbound text payload could not be decoded
    #[error("invalid text payload: {0}")]
    InvalidPayload(String),

    /// The operation requires an open transport
    #[error("transport is not open")]
    NotOpen,

    /// `open()` was called while another open on the same instance was in flight
    #[error("an open operation is already in progress")]
    OpenInProgress,

    /// `open()` was called on a transport that is already open
    #[error("transport is already open")]
    AlreadyOpen,

    /// The operation was aborted by a concurrent close
    #[error("operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Wrap a driver error raised while connecting
    pub fn connect(err: impl std::fmt::Display) -> Self {
        TransportError::Connect(err.to_string())
    }

    /// Wrap a driver error raised while sending
    pub fn send(err: impl std::fmt::Display) -> Self {
        TransportError::Send(err.to_string())
    }

    /// Wrap a driver error raised while receiving
    pub fn receive(err: impl std::fmt::Display) -> Self {
        TransportError::Receive(err.to_string())
    }

    /// Wrap a driver error raised while closing
    pub fn close(err: impl std::fmt::Display) -> Self {
        TransportError::Close(err.to_string())
    }

    /// True for the state-guard variants raised by the base layer itself
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            TransportError::NotOpen | TransportError::OpenInProgress | TransportError::AlreadyOpen
        )
    }
}
