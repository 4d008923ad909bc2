//! Client metrics definitions
//!
//! OpenTelemetry instruments describing connection health. They are exported
//! through whatever meter provider is installed globally, normally the one
//! set up by `resock_core::init_observability`.
//!
//! # Metrics Collected
//!
//! - **resock.client.connection.state**: Current state (0=closed, 1=connecting, 2=open, 3=closing)
//! - **resock.client.messages.received**: Inbound messages, by kind
//! - **resock.client.messages.sent**: Outbound messages, by kind
//! - **resock.client.send.failures**: Sends rejected by the transport
//! - **resock.client.open.failures**: Failed open attempts, by outcome
//! - **resock.client.open.duration**: Time from open start to open completion
//! - **resock.client.reopen.attempts**: Supervisor reopen attempts, by trigger
//! - **resock.client.reopen.success**: Reopen attempts that restored the connection
//!
//! # Examples
//!
//! ```rust
//! use resock_client::ClientMetrics;
//!
//! let metrics = ClientMetrics::new("ticker-client");
//! metrics.record_reopen_attempt("keep_alive_timeout");
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};
use resock_core::{ConnectionState, Message};

/// OpenTelemetry instruments for one client
pub struct ClientMetrics {
    /// Connection state gauge
    pub connection_state: Gauge<i64>,
    /// Inbound messages
    pub messages_received: Counter<u64>,
    /// Outbound messages
    pub messages_sent: Counter<u64>,
    /// Sends rejected by the transport
    pub send_failures: Counter<u64>,
    /// Failed open attempts
    pub open_failures: Counter<u64>,
    /// Successful open duration in seconds
    pub open_duration: Histogram<f64>,
    /// Supervisor reopen attempts
    pub reopen_attempts: Counter<u64>,
    /// Successful reopens
    pub reopen_success: Counter<u64>,
}

impl ClientMetrics {
    /// Create instruments on a meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    /// Create instruments on the given meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("resock.client.connection.state")
                .with_description("Connection state (0=closed, 1=connecting, 2=open, 3=closing)")
                .build(),
            messages_received: meter
                .u64_counter("resock.client.messages.received")
                .with_description("Total number of messages received")
                .build(),
            messages_sent: meter
                .u64_counter("resock.client.messages.sent")
                .with_description("Total number of messages sent")
                .build(),
            send_failures: meter
                .u64_counter("resock.client.send.failures")
                .with_description("Total number of sends rejected by the transport")
                .build(),
            open_failures: meter
                .u64_counter("resock.client.open.failures")
                .with_description("Total number of failed open attempts")
                .build(),
            open_duration: meter
                .f64_histogram("resock.client.open.duration")
                .with_description("Open duration in seconds")
                .with_unit("s")
                .build(),
            reopen_attempts: meter
                .u64_counter("resock.client.reopen.attempts")
                .with_description("Total number of reopen attempts")
                .build(),
            reopen_success: meter
                .u64_counter("resock.client.reopen.success")
                .with_description("Total number of successful reopens")
                .build(),
        }
    }

    /// Update connection state
    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.gauge_value(), &[]);
    }

    /// Record an inbound message
    pub fn record_received(&self, message: &Message) {
        self.messages_received
            .add(1, &[KeyValue::new("kind", message.kind())]);
    }

    /// Record an outbound message
    pub fn record_sent(&self, kind: &'static str) {
        self.messages_sent.add(1, &[KeyValue::new("kind", kind)]);
    }

    /// Record a send rejected by the transport
    pub fn record_send_failure(&self) {
        self.send_failures.add(1, &[]);
    }

    /// Record a completed open
    pub fn record_open(&self, duration_secs: f64) {
        self.open_duration.record(duration_secs, &[]);
    }

    /// Record a failed open; `outcome` is "timeout", "failure" or "cancelled"
    pub fn record_open_failure(&self, outcome: &'static str) {
        self.open_failures.add(1, &[KeyValue::new("outcome", outcome)]);
    }

    /// Record a reopen attempt
    pub fn record_reopen_attempt(&self, trigger: &'static str) {
        self.reopen_attempts.add(1, &[KeyValue::new("trigger", trigger)]);
    }

    /// Record a successful reopen
    pub fn record_reopen_success(&self) {
        self.reopen_success.add(1, &[]);
    }
}
