//! Fan-out of messages and lifecycle events
//!
//! Every inbound message has to reach every subscriber exactly once, in
//! receive order, without a slow subscriber holding up the others or the
//! transport's receive loop. Each subscriber therefore gets its own unbounded
//! queue fed from one publish point:
//!
//! - **Handler branches** (`on_message`, `on_event`) drain their queue in a
//!   dedicated task, awaiting the handler once per item. A panicking handler
//!   is logged and the branch keeps going.
//! - **Stream branches** (`messages()`, `events()`) hand the queue to the
//!   caller as a [`BroadcastStream`].
//!
//! Publishing never awaits. A bounded broadcast channel would drop items for
//! lagging receivers, which is why the queues are unbounded.

use crate::connection_state::Activity;
use futures::{FutureExt, Stream};
use parking_lot::Mutex;
use resock_core::Message;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Multi-subscriber fan-out with one queue per subscriber
pub(crate) struct Broadcast<T> {
    branches: Mutex<Vec<mpsc::UnboundedSender<T>>>,
    closed: std::sync::atomic::AtomicBool,
}

impl<T: Clone + Send + 'static> Broadcast<T> {
    pub(crate) fn new() -> Self {
        Self {
            branches: Mutex::new(Vec::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Queue `item` on every live branch; returns how many received it
    pub(crate) fn publish(&self, item: T) -> usize {
        let mut branches = self.branches.lock();
        branches.retain(|branch| branch.send(item.clone()).is_ok());
        branches.len()
    }

    fn branch(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Checked under the branch lock so a concurrent close cannot miss it
        let mut branches = self.branches.lock();
        if !self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            branches.push(tx);
        }
        rx
    }

    /// New stream branch receiving everything published from now on
    pub(crate) fn stream(&self) -> BroadcastStream<T> {
        BroadcastStream { rx: self.branch() }
    }

    /// New handler branch; `handler` runs once per item, sequentially
    pub(crate) fn spawn_handler<F, Fut>(&self, label: &'static str, handler: F) -> Subscription
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.branch();
        let task = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if AssertUnwindSafe(handler(item)).catch_unwind().await.is_err() {
                    tracing::error!(subscriber = label, "Subscriber panicked, continuing with next item");
                }
            }
        });
        Subscription { task }
    }

    /// Number of live branches
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        let mut branches = self.branches.lock();
        branches.retain(|branch| !branch.is_closed());
        branches.len()
    }

    /// Drop every branch; streams end and handler tasks finish their backlog
    pub(crate) fn close(&self) {
        let mut branches = self.branches.lock();
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        branches.clear();
    }
}

/// Delivers inbound messages, refreshing the keep-alive clock first
pub(crate) struct MessageDistributor {
    broadcast: Broadcast<Message>,
    activity: Arc<Activity>,
}

impl MessageDistributor {
    pub(crate) fn new(activity: Arc<Activity>) -> Self {
        Self {
            broadcast: Broadcast::new(),
            activity,
        }
    }

    /// Record the arrival, then fan the message out
    pub(crate) fn publish(&self, message: Message) -> usize {
        self.activity.touch_received();
        self.broadcast.publish(message)
    }

    pub(crate) fn broadcast(&self) -> &Broadcast<Message> {
        &self.broadcast
    }
}

/// Handle to a handler branch
///
/// Dropping the handle leaves the handler registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to stop it.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering to this handler
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    /// True once the handler task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Stream branch of a broadcast
///
/// Ends when the client shuts down.
#[derive(Debug)]
pub struct BroadcastStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> BroadcastStream<T> {
    /// Take the next queued item without waiting
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take every queued item without waiting
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}

impl<T> Stream for BroadcastStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Stream of inbound messages
pub type MessageStream = BroadcastStream<Message>;

/// Stream of lifecycle events
pub type EventStream = BroadcastStream<resock_core::LifecycleEvent>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_branch_sees_every_item_in_order() {
        let broadcast = Broadcast::<u32>::new();
        let mut first = broadcast.stream();
        let mut second = broadcast.stream();

        for n in 0..5 {
            assert_eq!(broadcast.publish(n), 2);
        }

        assert_eq!(first.drain(), vec![0, 1, 2, 3, 4]);
        assert_eq!(second.drain(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_dropped_stream_is_pruned() {
        let broadcast = Broadcast::<u32>::new();
        let kept = broadcast.stream();
        drop(broadcast.stream());

        assert_eq!(broadcast.publish(1), 1);
        assert_eq!(broadcast.subscriber_count(), 1);
        drop(kept);
        assert_eq!(broadcast.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_does_not_block_stream() {
        let broadcast = Broadcast::<u32>::new();
        let handled = Arc::new(AtomicUsize::new(0));

        let counter = handled.clone();
        broadcast.spawn_handler("slow", move |_| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let mut stream = broadcast.stream();

        broadcast.publish(7);
        broadcast.publish(8);

        assert_eq!(stream.next().await, Some(7));
        assert_eq!(stream.next().await, Some(8));
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_keeps_running() {
        let broadcast = Broadcast::<u32>::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        broadcast.spawn_handler("flaky", move |n| {
            let tx = tx.clone();
            async move {
                if n == 1 {
                    panic!("handler failure");
                }
                tx.send(n).unwrap();
            }
        });

        broadcast.publish(1);
        broadcast.publish(2);

        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let broadcast = Broadcast::<u32>::new();
        let mut stream = broadcast.stream();
        broadcast.publish(1);
        broadcast.close();

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, None);
        assert_eq!(broadcast.publish(2), 0);

        let mut late = broadcast.stream();
        assert_eq!(late.next().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_branches_racing_close_still_end() {
        for _ in 0..50 {
            let broadcast = Arc::new(Broadcast::<u32>::new());
            let registering: Vec<_> = (0..4)
                .map(|_| {
                    let broadcast = Arc::clone(&broadcast);
                    tokio::spawn(async move {
                        (0..25).map(|_| broadcast.stream()).collect::<Vec<_>>()
                    })
                })
                .collect();
            broadcast.close();

            for handle in registering {
                for mut stream in handle.await.unwrap() {
                    assert_eq!(stream.next().await, None);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_handler() {
        let broadcast = Broadcast::<u32>::new();
        let subscription = broadcast.spawn_handler("noop", |_| async {});
        subscription.unsubscribe();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        broadcast.publish(1);
        assert_eq!(broadcast.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_publish_touches_activity_first() {
        let activity = Arc::new(Activity::new());
        let distributor = MessageDistributor::new(activity.clone());
        let mut stream = distributor.broadcast().stream();

        tokio::time::advance(Duration::from_secs(5)).await;
        let before = tokio::time::Instant::now();
        distributor.publish(Message::text("tick"));

        assert!(activity.last_received() >= before);
        assert_eq!(stream.try_next(), Some(Message::text("tick")));
    }
}
