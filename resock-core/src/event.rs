//! Close codes and lifecycle notifications

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket close status code
///
/// Codes are passed through unmodified between the transport and observers;
/// the named constants cover the values resock itself produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// 1000: normal closure
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// 1001: endpoint going away
    pub const AWAY: CloseCode = CloseCode(1001);
    /// 1002: protocol error
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// 1005: no status code was present in the close frame
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// 1006: connection dropped without a close frame
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Numeric value of the code
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time notification about a connection's lifecycle
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// An open attempt started
    Opening,
    /// An open attempt succeeded
    Opened,
    /// A caller-requested close started
    Closing,
    /// The connection closed
    Closed {
        /// Close code, as reported by the transport or requested by the caller
        code: CloseCode,
        /// Close reason, if any
        reason: Option<String>,
    },
    /// An error was observed
    Error(Error),
    /// The reopen supervisor restored the connection
    Reopened,
}

impl LifecycleEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Opening => "opening",
            LifecycleEvent::Opened => "opened",
            LifecycleEvent::Closing => "closing",
            LifecycleEvent::Closed { .. } => "closed",
            LifecycleEvent::Error(_) => "error",
            LifecycleEvent::Reopened => "reopened",
        }
    }
}
