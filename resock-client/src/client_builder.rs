//! Client builder for configuring timeouts, auto-reopen and observability
//!
//! The `ClientBuilder` provides a fluent API for configuring a
//! [`ResilientClient`] before it is used. It allows you to:
//! - Set the open, close and keep-alive timeouts
//! - Enable automatic reopen on transport close or keep-alive timeout
//! - Configure observability (OpenTelemetry)
//! - Set service name for telemetry
//!
//! # Examples
//!
//! ```rust,no_run
//! use resock_client::ClientBuilder;
//! use std::time::Duration;
//! # use resock_core::TransportFactory;
//!
//! # async fn example(factory: impl TransportFactory + Clone) -> resock_core::Result<()> {
//! // Reopen when the peer goes quiet for 30 seconds
//! let client = ClientBuilder::new(factory.clone())
//!     .keep_alive_timeout(Duration::from_secs(30))
//!     .auto_reopen_on_keep_alive_timeout(true)
//!     .open()
//!     .await?;
//!
//! // With observability
//! let client2 = ClientBuilder::new(factory)
//!     .with_default_observability()
//!     .service_name("my-client")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::{ClientConfig, ClientMetrics, ResilientClient};
use resock_core::{Error, ObservabilityConfig, Result, TextEncoding, TransportFactory};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring and creating a ResilientClient
pub struct ClientBuilder {
    factory: Arc<dyn TransportFactory>,
    config: ClientConfig,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    metrics: bool,
}

impl ClientBuilder {
    /// Create a new client builder over a transport factory
    pub fn new(factory: impl TransportFactory) -> Self {
        Self::from_factory(Arc::new(factory))
    }

    /// Create a new client builder over a shared transport factory
    pub fn from_factory(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            config: ClientConfig::default(),
            observability_config: None,
            service_name: None,
            metrics: false,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Upper bound on one open attempt
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    /// Upper bound on the close handshake
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Silence after which the connection is presumed dead
    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    /// Minimum spacing between reopen attempts
    pub fn auto_reopen_throttle(mut self, throttle: Duration) -> Self {
        self.config.auto_reopen_throttle = throttle;
        self
    }

    /// Reopen when the transport is no longer open
    pub fn auto_reopen_on_closed(mut self, enabled: bool) -> Self {
        self.config.auto_reopen_on_closed = enabled;
        self
    }

    /// Reopen when nothing arrives within the keep-alive timeout
    pub fn auto_reopen_on_keep_alive_timeout(mut self, enabled: bool) -> Self {
        self.config.auto_reopen_on_keep_alive_timeout = enabled;
        self
    }

    /// Decoding of inbound text frames
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Record client metrics on the global meter without installing exporters
    ///
    /// Useful when the application sets up its own meter provider.
    pub fn with_metrics(mut self) -> Self {
        self.metrics = true;
        self
    }

    /// Build the client without opening it
    pub fn build(self) -> Result<ResilientClient> {
        // Initialize observability if configured
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            resock_core::init_observability(config.clone()).map_err(|e| {
                Error::InvalidOperation(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else if self.metrics {
            let name = self.service_name.unwrap_or_else(|| "resock".to_string());
            Some(Arc::new(ClientMetrics::new(name)))
        } else {
            None
        };

        tracing::debug!(config = ?self.config, "Building client");
        Ok(ResilientClient::new(self.factory, self.config, metrics))
    }

    /// Build the client and open it
    pub async fn open(self) -> Result<ResilientClient> {
        let client = self.build()?;
        client.open().await?;
        Ok(client)
    }
}
