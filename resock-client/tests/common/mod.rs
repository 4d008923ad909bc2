//! Common test utilities for resock-client integration tests
//!
//! This module provides a scripted in-memory transport so the client's state
//! machine can be driven deterministically, including under a paused clock.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use resock_client::{EventStream, LifecycleEvent};
use resock_core::{
    CloseCode, Delivery, Message, TextEncoding, TransportAdapter, TransportError,
    TransportEvent, TransportFactory, TransportListener,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shared behavior and recordings of every transport a factory creates
#[derive(Default)]
pub struct Script {
    pub open_delay: Mutex<Duration>,
    pub close_delay: Mutex<Duration>,
    pub send_delay: Mutex<Duration>,
    pub fail_opens: AtomicBool,
    pub fail_sends: AtomicBool,
    /// Peer close delivered after the handshake, before `open()` returns
    pub close_during_open: Mutex<Option<(CloseCode, String)>>,
    /// Go away silently after the handshake, before `open()` returns
    pub vanish_during_open: AtomicBool,
    pub creates: AtomicUsize,
    pub aborts: AtomicUsize,
    pub open_started: Mutex<Vec<Instant>>,
    pub sends: Mutex<Vec<Message>>,
    pub closes: Mutex<Vec<(CloseCode, String)>>,
    pub instances: Mutex<Vec<Arc<ScriptedTransport>>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_open_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.open_delay.lock() = delay;
        self
    }

    pub fn with_close_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.close_delay.lock() = delay;
        self
    }

    /// Most recently created transport
    pub fn latest(&self) -> Arc<ScriptedTransport> {
        self.instances
            .lock()
            .last()
            .cloned()
            .expect("no transport created yet")
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.open_started.lock().len()
    }
}

/// In-memory transport following the adapter contract
pub struct ScriptedTransport {
    script: Arc<Script>,
    listener: Arc<dyn TransportListener>,
    open: AtomicBool,
}

impl ScriptedTransport {
    /// Deliver an inbound message as the peer
    pub fn inject(&self, message: Message) -> Delivery {
        self.listener.on_event(TransportEvent::Message(message))
    }

    /// Close from the peer side with a close notification
    pub fn close_from_peer(&self, code: CloseCode, reason: &str) -> Delivery {
        self.open.store(false, Ordering::SeqCst);
        self.listener.on_event(TransportEvent::Closed {
            code,
            reason: Some(reason.to_string()),
        })
    }

    /// Stop being open without telling anyone
    pub fn vanish(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Report a receive failure
    pub fn fail_receive(&self, detail: &str) -> Delivery {
        self.listener
            .on_event(TransportEvent::Error(TransportError::receive(detail)))
    }
}

#[async_trait]
impl TransportAdapter for ScriptedTransport {
    async fn open(&self) -> Result<(), TransportError> {
        self.script.open_started.lock().push(Instant::now());
        let delay = *self.script.open_delay.lock();
        tokio::time::sleep(delay).await;
        if self.script.fail_opens.load(Ordering::SeqCst) {
            return Err(TransportError::connect("connection refused"));
        }
        self.open.store(true, Ordering::SeqCst);
        let close = self.script.close_during_open.lock().clone();
        if let Some((code, reason)) = close {
            self.close_from_peer(code, &reason);
        }
        if self.script.vanish_during_open.load(Ordering::SeqCst) {
            self.vanish();
        }
        Ok(())
    }

    async fn ensure_close(&self, code: CloseCode, reason: &str, _deadline: Duration) {
        self.script.closes.lock().push((code, reason.to_string()));
        let delay = *self.script.close_delay.lock();
        tokio::time::sleep(delay).await;
        self.open.store(false, Ordering::SeqCst);
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        let delay = *self.script.send_delay.lock();
        tokio::time::sleep(delay).await;
        if self.script.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::send("broken pipe"));
        }
        self.script.sends.lock().push(message);
        Ok(())
    }

    fn abort(&self) {
        self.script.aborts.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Factory handing out scripted transports
pub fn factory(script: &Arc<Script>) -> impl TransportFactory {
    let script = Arc::clone(script);
    move |listener: Arc<dyn TransportListener>, _encoding: TextEncoding| {
        script.creates.fetch_add(1, Ordering::SeqCst);
        let transport = Arc::new(ScriptedTransport {
            script: Arc::clone(&script),
            listener,
            open: AtomicBool::new(false),
        });
        script.instances.lock().push(Arc::clone(&transport));
        transport as Arc<dyn TransportAdapter>
    }
}

/// Let spawned tasks run without moving the clock
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Event names queued on a stream so far
pub fn names(events: &mut EventStream) -> Vec<&'static str> {
    events.drain().iter().map(LifecycleEvent::name).collect()
}
