//! WebSocket transport for resock built on tokio-tungstenite
//!
//! [`TungsteniteFactory`] creates one [`GuardedTransport`] per connection
//! attempt. The guarded base supplies the transport guarantees (single open,
//! idempotent close, receive loop); this crate only supplies the socket
//! mechanics through [`TungsteniteDriver`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use resock_client::ClientBuilder;
//! use resock_tungstenite::TungsteniteFactory;
//!
//! # async fn example() -> resock_core::Result<()> {
//! let factory = TungsteniteFactory::new("wss://stream.example.com/ws")
//!     .with_header("Authorization", "Bearer token");
//!
//! let client = ClientBuilder::new(factory)
//!     .auto_reopen_on_closed(true)
//!     .open()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod driver;

pub use driver::TungsteniteDriver;
pub use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use resock_core::{
    GuardedTransport, TextEncoding, TransportAdapter, TransportFactory, TransportListener,
};
use std::sync::Arc;

/// Builds tokio-tungstenite transports for one URL
#[derive(Debug, Clone)]
pub struct TungsteniteFactory {
    url: String,
    headers: Vec<(String, String)>,
    config: Option<WebSocketConfig>,
}

impl TungsteniteFactory {
    /// Factory connecting to `url` (`ws://` or `wss://`)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            config: None,
        }
    }

    /// Add a header to every handshake request
    ///
    /// Invalid names or values make the open fail with a connect error.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Use a custom tungstenite configuration (frame and message size limits)
    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TransportFactory for TungsteniteFactory {
    fn create(
        &self,
        listener: Arc<dyn TransportListener>,
        encoding: TextEncoding,
    ) -> Arc<dyn TransportAdapter> {
        tracing::trace!(url = %self.url, "Creating transport");
        let driver = TungsteniteDriver::new(
            self.url.clone(),
            self.headers.clone(),
            self.config.clone(),
        );
        Arc::new(GuardedTransport::new(driver, listener, encoding))
    }
}
