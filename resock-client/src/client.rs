//! Resilient connection state machine
//!
//! This module provides [`ResilientClient`], the single handle callers use to
//! open, send on, and close a logical connection. The client sits in front of
//! a pluggable transport (see [`resock_core::TransportAdapter`]) and adds:
//!
//! - **Operation dedup**: concurrent `open()` calls share one in-flight attempt,
//!   concurrent `close()` calls share one in-flight close
//! - **Bounded waits**: opens are bounded by the open timeout, closes by the
//!   close timeout
//! - **Automatic reopen**: a per-connection supervisor replaces dead
//!   transports (see the `supervisor` module)
//! - **Fan-out**: messages and lifecycle events are delivered to any number of
//!   handlers and streams without one blocking another
//!
//! # State Machine
//!
//! ```text
//! Closed --open--> Connecting --ok--> Open --close--> Closing --done--> Closed
//! Connecting --close--> Closed            (open attempt aborted)
//! Connecting --failure/timeout--> Closed  (error returned, no Closed event)
//! Open --peer close--> Closed             (Error + Closed events)
//! Connecting --peer close--> Closed       (open fails, Error + Closed events)
//! ```
//!
//! Every state write happens under one lifecycle lock together with the
//! bookkeeping of in-flight attempts, so two operations can never both
//! believe they own a transition. Events are published under the same lock,
//! which keeps them in transition order.
//!
//! # Transport Instances
//!
//! Each open attempt asks the factory for a fresh transport. The previous
//! instance is aborted. Notifications carry the id of the instance that
//! raised them; anything from a replaced instance is answered with
//! [`Delivery::Stale`], which makes that instance shut itself down.
//!
//! # Cloning
//!
//! `ResilientClient` is cheaply cloneable using `Arc` internally. All clones
//! share the same connection. Dropping the last clone shuts the connection
//! down, as does [`shutdown`](ResilientClient::shutdown).

use crate::config::ClientConfig;
use crate::connection_state::Activity;
use crate::distributor::{Broadcast, EventStream, MessageDistributor, MessageStream, Subscription};
use crate::metrics::ClientMetrics;
use crate::supervisor::{ReopenPolicy, ReopenReason, ReopenSupervisor, Supervised};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use resock_core::{
    AtomicConnectionState, CloseCode, ConnectionState, Delivery, Error, LifecycleEvent, Message,
    Result, TextEncoding, TransportAdapter, TransportEvent, TransportFactory, TransportListener,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Reason sent with a caller-requested close
pub const NORMAL_CLOSURE_REASON: &str = "Normal closure";

type OpenOutcome = Shared<BoxFuture<'static, Result<()>>>;
type CloseOutcome = Shared<BoxFuture<'static, ()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenCause {
    Caller,
    Reopen,
}

struct OpenAttempt {
    id: u64,
    task: AbortHandle,
    outcome: OpenOutcome,
    /// Report a failure as an `Error` event; set when a caller awaits the attempt
    announce: Arc<AtomicBool>,
    /// Peer close that arrived before the attempt finished
    peer_closed: Option<(CloseCode, Option<String>)>,
}

struct CloseAttempt {
    id: u64,
    outcome: CloseOutcome,
    announce: Arc<AtomicBool>,
}

struct ActiveTransport {
    id: u64,
    adapter: Arc<dyn TransportAdapter>,
}

/// In-flight operations and the active transport
///
/// Only ever touched under `Inner::lifecycle`.
#[derive(Default)]
struct Lifecycle {
    opening: Option<OpenAttempt>,
    closing: Option<CloseAttempt>,
    transport: Option<ActiveTransport>,
}

pub(crate) struct Inner {
    factory: Arc<dyn TransportFactory>,
    config: RwLock<ClientConfig>,
    state: AtomicConnectionState,
    lifecycle: Mutex<Lifecycle>,
    activity: Arc<Activity>,
    messages: MessageDistributor,
    events: Broadcast<LifecycleEvent>,
    supervisor: ReopenSupervisor,
    /// Set by `open()`, cleared by `close()`; reopen attempts only proceed while set
    reopen_armed: AtomicBool,
    disposed: AtomicBool,
    next_id: AtomicU64,
    metrics: Option<Arc<ClientMetrics>>,
}

/// Forwards one transport instance's notifications to the client
struct InstanceListener {
    id: u64,
    client: Weak<Inner>,
}

impl TransportListener for InstanceListener {
    fn on_event(&self, event: TransportEvent) -> Delivery {
        match self.client.upgrade() {
            Some(inner) => inner.handle_transport_event(self.id, event),
            None => Delivery::Stale,
        }
    }
}

enum OpenStep {
    Done,
    Await(OpenOutcome),
    AwaitClose(CloseOutcome),
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Write the state; requires the lifecycle lock
    fn transition(&self, _lifecycle: &mut Lifecycle, to: ConnectionState) {
        let from = self.state.swap(to);
        if from != to {
            tracing::debug!(from = %from, to = %to, "State transition");
        }
        if let Some(ref m) = self.metrics {
            m.update_connection_state(to);
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        tracing::trace!(event = event.name(), "Lifecycle event");
        self.events.publish(event);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::InvalidOperation("client has been shut down".to_string()));
        }
        Ok(())
    }

    fn is_stale(lifecycle: &Lifecycle, id: u64) -> bool {
        lifecycle.transport.as_ref().map(|t| t.id) != Some(id)
    }

    /// Start an open attempt on a fresh transport instance
    fn begin_open(self: &Arc<Self>, lifecycle: &mut Lifecycle, cause: OpenCause) -> OpenOutcome {
        let id = self.next_id();
        let (open_timeout, encoding) = {
            let config = self.config.read();
            (config.open_timeout, config.encoding)
        };

        self.transition(lifecycle, ConnectionState::Connecting);
        if cause == OpenCause::Caller {
            self.emit(LifecycleEvent::Opening);
        }

        let listener: Arc<dyn TransportListener> = Arc::new(InstanceListener {
            id,
            client: Arc::downgrade(self),
        });
        let adapter = self.factory.create(listener, encoding);
        if let Some(previous) = lifecycle.transport.replace(ActiveTransport {
            id,
            adapter: Arc::clone(&adapter),
        }) {
            tracing::debug!(transport_id = previous.id, "Aborting replaced transport");
            previous.adapter.abort();
        }

        tracing::debug!(transport_id = id, cause = ?cause, "Opening transport");
        let started = Instant::now();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(open_timeout, adapter.open()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Error::ConnectFailure(e)),
                Err(_) => Err(Error::ConnectTimeout(open_timeout)),
            };
            this.finish_open(id, cause, started, result)
        });

        let abort = task.abort_handle();
        let outcome = task
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(Error::ConnectCancelled),
                Err(e) => Err(Error::InvalidOperation(format!("open task failed: {}", e))),
            })
            .boxed()
            .shared();

        lifecycle.opening = Some(OpenAttempt {
            id,
            task: abort,
            outcome: outcome.clone(),
            announce: Arc::new(AtomicBool::new(cause == OpenCause::Caller)),
            peer_closed: None,
        });
        outcome
    }

    fn finish_open(
        &self,
        id: u64,
        cause: OpenCause,
        started: Instant,
        result: Result<()>,
    ) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.opening.as_ref().map(|a| a.id) != Some(id) {
            tracing::debug!(transport_id = id, "Open attempt was superseded");
            return Err(Error::ConnectCancelled);
        }
        let Some(attempt) = lifecycle.opening.take() else {
            return Err(Error::ConnectCancelled);
        };

        let alive = lifecycle
            .transport
            .as_ref()
            .is_some_and(|t| t.id == id && t.adapter.is_open());
        let result = match result {
            Ok(()) if attempt.peer_closed.is_some() || !alive => {
                let (code, reason) = attempt.peer_closed.unwrap_or((
                    CloseCode::ABNORMAL,
                    Some("transport closed while opening".to_string()),
                ));
                return Err(self.fail_dead_open(&mut lifecycle, id, code, reason));
            }
            other => other,
        };

        match result {
            Ok(()) => {
                self.activity.touch_received();
                self.transition(&mut lifecycle, ConnectionState::Open);
                if let Some(ref m) = self.metrics {
                    m.record_open(started.elapsed().as_secs_f64());
                }
                match cause {
                    OpenCause::Caller => {
                        tracing::info!(transport_id = id, "Connection opened");
                        self.emit(LifecycleEvent::Opened);
                    }
                    OpenCause::Reopen => {
                        tracing::info!(transport_id = id, "Connection reopened");
                        self.emit(LifecycleEvent::Reopened);
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.transition(&mut lifecycle, ConnectionState::Closed);
                if let Some(transport) = lifecycle.transport.take() {
                    transport.adapter.abort();
                }
                if let Some(ref m) = self.metrics {
                    let outcome = match e {
                        Error::ConnectTimeout(_) => "timeout",
                        _ => "failure",
                    };
                    m.record_open_failure(outcome);
                }
                tracing::warn!(transport_id = id, error = %e, "Open failed");
                if attempt.announce.load(Ordering::SeqCst) {
                    self.emit(LifecycleEvent::Error(e.clone()));
                }
                Err(e)
            }
        }
    }

    /// The transport opened but closed before the attempt could complete
    fn fail_dead_open(
        &self,
        lifecycle: &mut Lifecycle,
        id: u64,
        code: CloseCode,
        reason: Option<String>,
    ) -> Error {
        self.transition(lifecycle, ConnectionState::Closed);
        if let Some(transport) = lifecycle.transport.take() {
            transport.adapter.abort();
        }
        if let Some(ref m) = self.metrics {
            m.record_open_failure("closed");
        }
        tracing::warn!(
            transport_id = id,
            code = %code,
            reason = reason.as_deref().unwrap_or(""),
            "Connection closed while opening"
        );
        let error = Error::UnexpectedClose {
            code,
            reason: reason.clone(),
        };
        self.emit(LifecycleEvent::Error(error.clone()));
        self.emit(LifecycleEvent::Closed { code, reason });
        error
    }

    /// Start a graceful close of the active transport
    fn begin_close(
        self: &Arc<Self>,
        lifecycle: &mut Lifecycle,
        code: CloseCode,
        reason: &'static str,
        announce: bool,
    ) -> CloseOutcome {
        let Some(adapter) = lifecycle.transport.as_ref().map(|t| Arc::clone(&t.adapter)) else {
            self.transition(lifecycle, ConnectionState::Closed);
            return futures::future::ready(()).boxed().shared();
        };

        let id = self.next_id();
        let close_timeout = self.config.read().close_timeout;
        self.transition(lifecycle, ConnectionState::Closing);
        if announce {
            self.emit(LifecycleEvent::Closing);
        }

        let announce = Arc::new(AtomicBool::new(announce));
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let close = adapter.ensure_close(code, reason, close_timeout);
            if tokio::time::timeout(close_timeout, close).await.is_err() {
                tracing::warn!(code = %code, "Close did not finish in time, aborting transport");
                adapter.abort();
            }
            this.finish_close(id, code, reason);
        });

        let outcome = task.map(|_| ()).boxed().shared();
        lifecycle.closing = Some(CloseAttempt {
            id,
            outcome: outcome.clone(),
            announce,
        });
        outcome
    }

    fn finish_close(&self, id: u64, code: CloseCode, reason: &'static str) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closing.as_ref().map(|a| a.id) != Some(id) {
            return;
        }
        let Some(attempt) = lifecycle.closing.take() else {
            return;
        };
        lifecycle.transport = None;
        self.transition(&mut lifecycle, ConnectionState::Closed);
        if attempt.announce.load(Ordering::SeqCst) {
            tracing::info!(code = %code, reason, "Connection closed");
            self.emit(LifecycleEvent::Closed {
                code,
                reason: Some(reason.to_string()),
            });
        }
    }

    fn handle_transport_event(&self, id: u64, event: TransportEvent) -> Delivery {
        if self.disposed.load(Ordering::SeqCst) {
            return Delivery::Stale;
        }

        let mut lifecycle = self.lifecycle.lock();
        if Self::is_stale(&lifecycle, id) {
            tracing::debug!(transport_id = id, "Notification from a replaced transport");
            return Delivery::Stale;
        }

        match event {
            TransportEvent::Message(message) => {
                if let Some(ref m) = self.metrics {
                    m.record_received(&message);
                }
                let delivered = self.messages.publish(message);
                tracing::trace!(transport_id = id, subscribers = delivered, "Message delivered");
            }
            TransportEvent::Closed { code, reason } => {
                if self.state.load() == ConnectionState::Open {
                    tracing::warn!(
                        transport_id = id,
                        code = %code,
                        reason = reason.as_deref().unwrap_or(""),
                        "Connection closed unexpectedly"
                    );
                    self.transition(&mut lifecycle, ConnectionState::Closed);
                    self.emit(LifecycleEvent::Error(Error::UnexpectedClose {
                        code,
                        reason: reason.clone(),
                    }));
                    self.emit(LifecycleEvent::Closed { code, reason });
                } else if let Some(attempt) = lifecycle.opening.as_mut() {
                    tracing::debug!(transport_id = id, code = %code, "Closed while opening");
                    attempt.peer_closed = Some((code, reason));
                } else {
                    tracing::debug!(transport_id = id, code = %code, "Close notification ignored");
                }
            }
            TransportEvent::Error(e) => {
                tracing::warn!(transport_id = id, error = %e, "Transport error");
                self.emit(LifecycleEvent::Error(Error::Transport(e)));
            }
        }
        Delivery::Accepted
    }

    fn enable_supervisor(self: &Arc<Self>) {
        if self.reopen_armed.load(Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst) {
            self.supervisor.enable(Arc::downgrade(self));
        }
    }

    async fn run_reopen(self: Arc<Self>, reason: ReopenReason) -> Result<()> {
        if let Some(ref m) = self.metrics {
            m.record_reopen_attempt(reason.as_str());
        }

        let pending_close = {
            let mut lifecycle = self.lifecycle.lock();
            if !self.reopen_armed.load(Ordering::SeqCst) || self.disposed.load(Ordering::SeqCst) {
                return Ok(());
            }
            match self.state.load() {
                ConnectionState::Open => Some(self.begin_close(
                    &mut lifecycle,
                    CloseCode::AWAY,
                    reason.close_reason(),
                    false,
                )),
                ConnectionState::Closed => {
                    if let Some(transport) = lifecycle.transport.as_ref() {
                        transport.adapter.abort();
                    }
                    None
                }
                ConnectionState::Connecting | ConnectionState::Closing => {
                    tracing::debug!("Another operation is in flight, reopen skipped");
                    return Ok(());
                }
            }
        };
        if let Some(close) = pending_close {
            close.await;
        }

        let outcome = {
            let mut lifecycle = self.lifecycle.lock();
            if !self.reopen_armed.load(Ordering::SeqCst)
                || self.disposed.load(Ordering::SeqCst)
                || self.state.load() != ConnectionState::Closed
            {
                return Ok(());
            }
            self.begin_open(&mut lifecycle, OpenCause::Reopen)
        };
        outcome.await?;

        if let Some(ref m) = self.metrics {
            m.record_reopen_success();
        }
        Ok(())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reopen_armed.store(false, Ordering::SeqCst);
        self.supervisor.shutdown();

        {
            let mut lifecycle = self.lifecycle.lock();
            if let Some(attempt) = lifecycle.opening.take() {
                attempt.task.abort();
            }
            lifecycle.closing = None;
            if let Some(transport) = lifecycle.transport.take() {
                transport.adapter.abort();
            }
            self.transition(&mut lifecycle, ConnectionState::Closed);
        }

        self.messages.broadcast().close();
        self.events.close();
        tracing::debug!("Client shut down");
    }
}

impl Supervised for Inner {
    fn reopen_policy(&self) -> ReopenPolicy {
        self.config.read().reopen_policy()
    }

    fn state(&self) -> ConnectionState {
        self.state.load()
    }

    fn transport_open(&self) -> bool {
        self.lifecycle
            .lock()
            .transport
            .as_ref()
            .is_some_and(|t| t.adapter.is_open())
    }

    fn activity(&self) -> &Activity {
        &self.activity
    }

    fn reopen(self: Arc<Self>, reason: ReopenReason) -> BoxFuture<'static, Result<()>> {
        self.run_reopen(reason).boxed()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Resilient connection handle
///
/// # Examples
///
/// ```rust,no_run
/// use resock_client::ClientBuilder;
/// use resock_core::LifecycleEvent;
/// # use resock_core::TransportFactory;
///
/// # async fn example(factory: impl TransportFactory) -> resock_core::Result<()> {
/// let client = ClientBuilder::new(factory)
///     .auto_reopen_on_closed(true)
///     .build()?;
///
/// client.on_message(|message| async move {
///     println!("received {}", message);
/// });
/// client.on_event(|event| async move {
///     if let LifecycleEvent::Reopened = event {
///         println!("connection restored");
///     }
/// });
///
/// client.open().await?;
/// client.send_text("hello").await?;
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResilientClient {
    inner: Arc<Inner>,
}

impl ResilientClient {
    pub(crate) fn new(
        factory: Arc<dyn TransportFactory>,
        config: ClientConfig,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let activity = Arc::new(Activity::new());
        let inner = Arc::new(Inner {
            factory,
            config: RwLock::new(config),
            state: AtomicConnectionState::default(),
            lifecycle: Mutex::new(Lifecycle::default()),
            messages: MessageDistributor::new(Arc::clone(&activity)),
            activity,
            events: Broadcast::new(),
            supervisor: ReopenSupervisor::new(),
            reopen_armed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            metrics,
        });
        Self { inner }
    }

    /// Open the connection
    ///
    /// - **Closed**: starts an attempt bounded by the open timeout
    /// - **Connecting**: awaits the attempt already in flight
    /// - **Open**: returns immediately
    /// - **Closing**: waits for the close to finish, then opens
    ///
    /// On success the reopen supervisor is enabled. A failed attempt leaves
    /// the state `Closed` and returns `ConnectTimeout`, `ConnectFailure` or
    /// `ConnectCancelled`, also published as an `Error` event. A transport
    /// that closes before the attempt completes fails it with
    /// `UnexpectedClose`, followed by `Error` and `Closed` events carrying the
    /// peer's close code.
    ///
    /// Joining an attempt started by the reopen supervisor does not emit
    /// `Opening`, and success is reported as `Reopened` rather than `Opened`.
    #[tracing::instrument(skip(self))]
    pub async fn open(&self) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_live()?;
        inner.reopen_armed.store(true, Ordering::SeqCst);

        loop {
            let step = {
                let mut lifecycle = inner.lifecycle.lock();
                match inner.state.load() {
                    ConnectionState::Closed => {
                        OpenStep::Await(inner.begin_open(&mut lifecycle, OpenCause::Caller))
                    }
                    ConnectionState::Connecting => match lifecycle.opening.as_ref() {
                        Some(attempt) => {
                            tracing::debug!("Open already in progress, waiting for it");
                            // A reopen fails silently; a caller joining it wants the error
                            attempt.announce.store(true, Ordering::SeqCst);
                            OpenStep::Await(attempt.outcome.clone())
                        }
                        None => {
                            return Err(Error::InvalidOperation(
                                "connecting without an open attempt".to_string(),
                            ))
                        }
                    },
                    ConnectionState::Open => {
                        tracing::debug!("Already open");
                        OpenStep::Done
                    }
                    ConnectionState::Closing => match lifecycle.closing.as_ref() {
                        Some(attempt) => {
                            tracing::debug!("Close in progress, waiting before opening");
                            OpenStep::AwaitClose(attempt.outcome.clone())
                        }
                        None => {
                            return Err(Error::InvalidOperation(
                                "closing without a close attempt".to_string(),
                            ))
                        }
                    },
                }
            };

            match step {
                OpenStep::Done => break,
                OpenStep::Await(outcome) => {
                    outcome.await?;
                    break;
                }
                OpenStep::AwaitClose(close) => close.await,
            }
        }

        inner.enable_supervisor();
        Ok(())
    }

    /// Close the connection
    ///
    /// Disables the reopen supervisor first, whatever the state.
    ///
    /// - **Open**: sends a normal close, bounded by the close timeout
    /// - **Closing**: awaits the close already in flight
    /// - **Connecting**: aborts the open attempt and its transport
    /// - **Closed**: returns immediately
    ///
    /// Exactly one `Closing`/`Closed` pair is emitted however many callers
    /// close concurrently.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        let inner = &self.inner;
        inner.reopen_armed.store(false, Ordering::SeqCst);
        inner.supervisor.disable();

        let pending = {
            let mut lifecycle = inner.lifecycle.lock();
            match inner.state.load() {
                ConnectionState::Closed => {
                    tracing::debug!("Already closed");
                    None
                }
                ConnectionState::Connecting => {
                    if let Some(attempt) = lifecycle.opening.take() {
                        attempt.task.abort();
                    }
                    if let Some(transport) = lifecycle.transport.take() {
                        transport.adapter.abort();
                    }
                    inner.transition(&mut lifecycle, ConnectionState::Closed);
                    tracing::info!("Open cancelled by close");
                    inner.emit(LifecycleEvent::Closed {
                        code: CloseCode::NORMAL,
                        reason: Some(NORMAL_CLOSURE_REASON.to_string()),
                    });
                    None
                }
                ConnectionState::Open => Some(inner.begin_close(
                    &mut lifecycle,
                    CloseCode::NORMAL,
                    NORMAL_CLOSURE_REASON,
                    true,
                )),
                ConnectionState::Closing => lifecycle.closing.as_ref().map(|attempt| {
                    // A reopen's close runs silently; a caller joining it wants the events
                    if !attempt.announce.swap(true, Ordering::SeqCst) {
                        inner.emit(LifecycleEvent::Closing);
                    }
                    attempt.outcome.clone()
                }),
            }
        };

        if let Some(close) = pending {
            close.await;
        }
        Ok(())
    }

    /// Send a message
    ///
    /// Fails with `InvalidOperation` without touching the transport unless
    /// the state is `Open`. A transport failure is returned as `SendFailure`
    /// and leaves the state unchanged.
    #[tracing::instrument(skip(self, message), fields(kind, len))]
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        let message = message.into();
        let kind = message.kind();
        tracing::Span::current()
            .record("kind", kind)
            .record("len", message.len());

        let adapter = {
            let lifecycle = self.inner.lifecycle.lock();
            let state = self.inner.state.load();
            match lifecycle.transport.as_ref() {
                Some(transport) if state == ConnectionState::Open => Arc::clone(&transport.adapter),
                _ => {
                    let error = Error::InvalidOperation(format!("cannot send while {}", state));
                    self.inner.emit(LifecycleEvent::Error(error.clone()));
                    return Err(error);
                }
            }
        };

        match adapter.send(message).await {
            Ok(()) => {
                if let Some(ref m) = self.inner.metrics {
                    m.record_sent(kind);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(ref m) = self.inner.metrics {
                    m.record_send_failure();
                }
                tracing::warn!(error = %e, "Send failed");
                let error = Error::SendFailure(e);
                self.inner.emit(LifecycleEvent::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Send a message, failing with `SendTimeout` once `deadline` elapses
    pub async fn send_with_timeout(
        &self,
        message: impl Into<Message>,
        deadline: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(deadline, self.send(message)).await {
            Ok(result) => result,
            Err(_) => {
                let error = Error::SendTimeout(deadline);
                self.inner.emit(LifecycleEvent::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Send a text message
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    /// Send a binary message
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    /// True while the state is `Open`
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// When the last message arrived (or the last open completed)
    pub fn last_received(&self) -> Instant {
        self.inner.activity.last_received()
    }

    /// Register a message handler
    ///
    /// The handler runs in its own task, once per message, in receive order.
    pub fn on_message<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .messages
            .broadcast()
            .spawn_handler("message", handler)
    }

    /// Stream of messages received from now on
    pub fn messages(&self) -> MessageStream {
        self.inner.messages.broadcast().stream()
    }

    /// Register a lifecycle event handler
    pub fn on_event<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(LifecycleEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.spawn_handler("event", handler)
    }

    /// Stream of lifecycle events emitted from now on
    pub fn events(&self) -> EventStream {
        self.inner.events.stream()
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> ClientConfig {
        self.inner.config.read().clone()
    }

    /// Set the open timeout used by subsequent attempts
    pub fn set_open_timeout(&self, timeout: Duration) {
        self.inner.config.write().open_timeout = timeout;
    }

    /// Set the close timeout used by subsequent closes
    pub fn set_close_timeout(&self, timeout: Duration) {
        self.inner.config.write().close_timeout = timeout;
    }

    /// Set the keep-alive timeout; zero disables keep-alive detection
    pub fn set_keep_alive_timeout(&self, timeout: Duration) {
        self.inner.config.write().keep_alive_timeout = timeout;
    }

    /// Set the minimum spacing between reopen attempts
    pub fn set_auto_reopen_throttle(&self, throttle: Duration) {
        self.inner.config.write().auto_reopen_throttle = throttle;
    }

    /// Toggle reopening when the transport is no longer open; applies from the next tick
    pub fn set_auto_reopen_on_closed(&self, enabled: bool) {
        self.inner.config.write().auto_reopen_on_closed = enabled;
    }

    /// Toggle reopening on keep-alive timeout; applies from the next tick
    pub fn set_auto_reopen_on_keep_alive_timeout(&self, enabled: bool) {
        self.inner.config.write().auto_reopen_on_keep_alive_timeout = enabled;
    }

    /// Set the decoding of inbound text, applied to the next transport instance
    pub fn set_encoding(&self, encoding: TextEncoding) {
        self.inner.config.write().encoding = encoding;
    }

    /// True while the reopen supervisor is ticking
    pub fn is_supervised(&self) -> bool {
        self.inner.supervisor.is_enabled()
    }

    /// Stop the supervisor, abort the transport and end all streams
    ///
    /// No events are delivered afterwards and `open()` fails with
    /// `InvalidOperation`. Dropping the last clone has the same effect.
    pub fn shutdown(&self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("state", &self.state())
            .field("config", &*self.inner.config.read())
            .finish()
    }
}
