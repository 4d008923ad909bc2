//! Client configuration
//!
//! [`ClientConfig`] carries every tunable of a [`ResilientClient`](crate::ResilientClient).
//! It serializes with durations in milliseconds so it can be embedded in an
//! application's own configuration file:
//!
//! ```rust
//! use resock_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::from_json(r#"{
//!     "keep_alive_timeout_ms": 30000,
//!     "auto_reopen_on_keep_alive_timeout": true
//! }"#).unwrap();
//!
//! assert_eq!(config.keep_alive_timeout, Duration::from_secs(30));
//! assert_eq!(config.open_timeout, Duration::from_secs(10));
//! ```

use crate::supervisor::ReopenPolicy;
use resock_core::TextEncoding;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection timeouts and auto-reopen behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound on one open attempt
    #[serde(rename = "open_timeout_ms", with = "duration_ms")]
    pub open_timeout: Duration,

    /// Upper bound on the close handshake before the transport is aborted
    #[serde(rename = "close_timeout_ms", with = "duration_ms")]
    pub close_timeout: Duration,

    /// Silence after which the connection is presumed dead; zero disables the check
    #[serde(rename = "keep_alive_timeout_ms", with = "duration_ms")]
    pub keep_alive_timeout: Duration,

    /// Minimum spacing between two reopen attempts
    #[serde(rename = "auto_reopen_throttle_ms", with = "duration_ms")]
    pub auto_reopen_throttle: Duration,

    /// Reopen when the transport reports it is no longer open
    pub auto_reopen_on_closed: bool,

    /// Reopen when nothing was received for longer than `keep_alive_timeout`
    pub auto_reopen_on_keep_alive_timeout: bool,

    /// Decoding of inbound text frames
    pub encoding: TextEncoding,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_TIMEOUT,
            close_timeout: DEFAULT_TIMEOUT,
            keep_alive_timeout: DEFAULT_TIMEOUT,
            auto_reopen_throttle: DEFAULT_TIMEOUT,
            auto_reopen_on_closed: false,
            auto_reopen_on_keep_alive_timeout: false,
            encoding: TextEncoding::Utf8,
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub(crate) fn reopen_policy(&self) -> ReopenPolicy {
        ReopenPolicy {
            on_closed: self.auto_reopen_on_closed,
            on_keep_alive_timeout: self.auto_reopen_on_keep_alive_timeout,
            keep_alive_timeout: self.keep_alive_timeout,
            throttle: self.auto_reopen_throttle,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
