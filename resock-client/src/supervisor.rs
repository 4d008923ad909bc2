//! Reopen supervisor
//!
//! A per-connection watchdog that ticks once a second while enabled and
//! decides whether the connection should be torn down and opened again.
//! Two independent signals trigger a reopen:
//!
//! - **Transport closed**: the active transport reports it is not open. This
//!   catches sockets that died without ever delivering a close notification.
//! - **Keep-alive timeout**: nothing arrived for longer than the keep-alive
//!   timeout.
//!
//! On each tick, in order:
//!
//! 1. Skip while a reopen attempt is still running (reentrancy guard)
//! 2. Skip when both triggers are disabled, or a caller-driven open/close is in flight
//! 3. Skip while the last attempt is closer than the throttle
//! 4. Reopen if the transport is closed and that trigger is enabled
//! 5. Otherwise reopen if the keep-alive timeout elapsed and that trigger is enabled
//!
//! The attempt itself runs in its own task so ticks never wait on it. The
//! task is tracked, and the guard is released by a drop guard whether the
//! attempt succeeds, fails or is aborted.

use crate::connection_state::Activity;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use resock_core::{ConnectionState, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Interval between two supervisor evaluations
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Reopen triggers and timing, snapshotted from the client config on every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReopenPolicy {
    pub on_closed: bool,
    pub on_keep_alive_timeout: bool,
    pub keep_alive_timeout: Duration,
    pub throttle: Duration,
}

impl ReopenPolicy {
    fn is_idle(&self) -> bool {
        !self.on_closed && !self.on_keep_alive_timeout
    }
}

/// Why the supervisor decided to reopen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReopenReason {
    /// The transport reported it is no longer open
    TransportClosed,
    /// Nothing was received for longer than the keep-alive timeout
    KeepAliveTimeout,
}

impl ReopenReason {
    /// Metric and log label
    pub fn as_str(&self) -> &'static str {
        match self {
            ReopenReason::TransportClosed => "transport_closed",
            ReopenReason::KeepAliveTimeout => "keep_alive_timeout",
        }
    }

    /// Reason sent with the close frame of the forced close
    pub fn close_reason(&self) -> &'static str {
        match self {
            ReopenReason::TransportClosed => "reopen: transport not open",
            ReopenReason::KeepAliveTimeout => "reopen: keep alive timeout",
        }
    }
}

/// What the supervisor watches and drives
pub(crate) trait Supervised: Send + Sync + 'static {
    fn reopen_policy(&self) -> ReopenPolicy;

    fn state(&self) -> ConnectionState;

    /// Whether the active transport instance reports itself open
    fn transport_open(&self) -> bool;

    fn activity(&self) -> &Activity;

    /// Force-close the current transport and open a fresh one
    fn reopen(self: Arc<Self>, reason: ReopenReason) -> BoxFuture<'static, Result<()>>;
}

/// Decide whether this tick should reopen
pub(crate) fn evaluate(
    policy: &ReopenPolicy,
    state: ConnectionState,
    transport_open: bool,
    activity: &Activity,
    now: Instant,
) -> Option<ReopenReason> {
    if policy.is_idle() {
        return None;
    }
    if !matches!(state, ConnectionState::Open | ConnectionState::Closed) {
        return None;
    }
    if activity.reopen_throttled(now, policy.throttle) {
        return None;
    }

    if policy.on_closed && !transport_open {
        return Some(ReopenReason::TransportClosed);
    }

    if policy.on_keep_alive_timeout
        && !policy.keep_alive_timeout.is_zero()
        && activity.silent_for(now) > policy.keep_alive_timeout
    {
        return Some(ReopenReason::KeepAliveTimeout);
    }

    None
}

/// Clears the reentrancy flag when a reopen attempt ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Ticking watchdog owned by one connection
pub(crate) struct ReopenSupervisor {
    ticker: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<AtomicBool>,
    attempt: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ReopenSupervisor {
    pub(crate) fn new() -> Self {
        Self {
            ticker: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
            attempt: Arc::new(Mutex::new(None)),
        }
    }

    /// Start ticking; no-op while already running
    pub(crate) fn enable<S: Supervised>(&self, target: Weak<S>) {
        let mut ticker = self.ticker.lock();
        if ticker.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        tracing::debug!("Reopen supervisor enabled");
        *ticker = Some(tokio::spawn(run(
            target,
            Arc::clone(&self.in_flight),
            Arc::clone(&self.attempt),
        )));
    }

    /// Stop ticking; a reopen attempt already running is left to finish
    pub(crate) fn disable(&self) {
        if let Some(task) = self.ticker.lock().take() {
            task.abort();
            tracing::debug!("Reopen supervisor disabled");
        }
    }

    /// Stop ticking and abort any running attempt
    pub(crate) fn shutdown(&self) {
        self.disable();
        if let Some(task) = self.attempt.lock().take() {
            task.abort();
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

async fn run<S: Supervised>(
    target: Weak<S>,
    in_flight: Arc<AtomicBool>,
    attempt: Arc<Mutex<Option<JoinHandle<()>>>>,
) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(target) = target.upgrade() else {
            return;
        };
        tick(target, &in_flight, &attempt);
    }
}

fn tick<S: Supervised>(
    target: Arc<S>,
    in_flight: &Arc<AtomicBool>,
    attempt: &Arc<Mutex<Option<JoinHandle<()>>>>,
) {
    if in_flight.load(Ordering::SeqCst) {
        tracing::trace!("Reopen attempt still running, skipping tick");
        return;
    }

    let policy = target.reopen_policy();
    if policy.is_idle() {
        tracing::debug!("Auto reopen disabled, supervisor idle");
        return;
    }

    let now = Instant::now();
    let Some(reason) = evaluate(
        &policy,
        target.state(),
        target.transport_open(),
        target.activity(),
        now,
    ) else {
        return;
    };

    if in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }
    let guard = InFlightGuard(Arc::clone(in_flight));
    target.activity().mark_reopen(now);

    tracing::info!(trigger = reason.as_str(), "Reopening connection");
    let task = tokio::spawn(async move {
        let _guard = guard;
        match target.reopen(reason).await {
            Ok(()) => tracing::debug!(trigger = reason.as_str(), "Reopen attempt finished"),
            Err(e) => tracing::warn!(
                trigger = reason.as_str(),
                error = %e,
                "Reopen failed, retrying on a later tick"
            ),
        }
    });
    *attempt.lock() = Some(task);
}
