//! Event fan-out for subscriptions.
//!
//! A [`Broadcaster`] keeps a registry of subscribers, each owning a bounded
//! inbound queue. Publishers call [`Broadcaster::broadcast`], which never
//! blocks: a full queue drops the event for that subscriber. A relay task per
//! subscriber forwards its queue to the returned [`Subscription`] stream and
//! unregisters it once the client, the request context or the broadcaster
//! goes away.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;

/// Lifecycle of a subscription. The last three states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Registered,
    Streaming,
    ClientCancelled,
    ContextCancelled,
    ServerClosed,
}

impl SubscriptionState {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            SubscriptionState::Registered | SubscriptionState::Streaming
        )
    }
}

/// Key filter used by subscription arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter<K> {
    All,
    Matching(K),
}

impl<K: PartialEq> Filter<K> {
    pub fn matches(&self, key: &K) -> bool {
        match self {
            Filter::All => true,
            Filter::Matching(wanted) => wanted == key,
        }
    }
}

impl Filter<i64> {
    /// `-1` subscribes to every key.
    pub fn from_sentinel(id: i64) -> Self {
        if id == -1 {
            Filter::All
        } else {
            Filter::Matching(id)
        }
    }
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Matching subscribers whose queue was full.
    pub dropped: usize,
}

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

struct Subscriber<E> {
    sender: mpsc::Sender<E>,
    filter: Predicate<E>,
}

struct Shared<E> {
    subscribers: RwLock<HashMap<u64, Subscriber<E>>>,
    next_id: AtomicU64,
    buffer_size: usize,
    closing: CancellationToken,
}

pub struct Broadcaster<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for Broadcaster<E> {
    fn clone(&self) -> Self {
        Broadcaster {
            shared: self.shared.clone(),
        }
    }
}

impl<E: Clone + Send + Sync + 'static> Broadcaster<E> {
    pub fn new(buffer_size: usize) -> Self {
        Broadcaster {
            shared: Arc::new(Shared {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer_size: buffer_size.max(1),
                closing: CancellationToken::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, filter: F, ctx: &ExecutionContext) -> Subscription<E>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.register(Box::new(filter), None, ctx)
    }

    /// Like [`Broadcaster::subscribe`], emitting `greeting` before any
    /// broadcast event.
    pub fn subscribe_with_greeting<F>(
        &self,
        filter: F,
        greeting: E,
        ctx: &ExecutionContext,
    ) -> Subscription<E>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.register(Box::new(filter), Some(greeting), ctx)
    }

    fn register(
        &self,
        filter: Predicate<E>,
        greeting: Option<E>,
        ctx: &ExecutionContext,
    ) -> Subscription<E> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.shared.buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.shared.buffer_size + 1);
        let state = Arc::new(Mutex::new(SubscriptionState::Registered));

        self.shared.subscribers.write().insert(
            id,
            Subscriber {
                sender: inbound_tx,
                filter,
            },
        );
        tracing::debug!(subscription = id, "subscriber registered");

        if let Some(greeting) = greeting {
            // The outbound queue is empty and has room for it.
            let _ = outbound_tx.try_send(greeting);
        }

        tokio::spawn(relay(
            self.shared.clone(),
            id,
            inbound_rx,
            outbound_tx,
            ctx.clone(),
            state.clone(),
        ));

        Subscription {
            id,
            inner: ReceiverStream::new(outbound_rx),
            state,
            ctx: ctx.clone(),
        }
    }

    /// Offers `event` to every subscriber whose filter accepts it. Never
    /// waits on a slow subscriber.
    pub fn broadcast(&self, event: &E) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let subscribers = self.shared.subscribers.read();
        for (id, subscriber) in subscribers.iter() {
            if !(subscriber.filter)(event) {
                continue;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscription = id, "subscriber queue full, event dropped");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        tracing::trace!(
            delivered = report.delivered,
            dropped = report.dropped,
            "event broadcast"
        );
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Ends every subscription with [`SubscriptionState::ServerClosed`].
    pub fn close(&self) {
        self.shared.closing.cancel();
    }
}

async fn relay<E>(
    shared: Arc<Shared<E>>,
    id: u64,
    mut inbound: mpsc::Receiver<E>,
    outbound: mpsc::Sender<E>,
    ctx: ExecutionContext,
    state: Arc<Mutex<SubscriptionState>>,
) {
    *state.lock() = SubscriptionState::Streaming;
    let terminal = loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => break SubscriptionState::ContextCancelled,
            _ = shared.closing.cancelled() => break SubscriptionState::ServerClosed,
            _ = outbound.closed() => break SubscriptionState::ClientCancelled,
            event = inbound.recv() => {
                let Some(event) = event else {
                    break SubscriptionState::ServerClosed;
                };
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break SubscriptionState::ContextCancelled,
                    sent = outbound.send(event) => {
                        if sent.is_err() {
                            break SubscriptionState::ClientCancelled;
                        }
                    }
                }
            }
        }
    };

    *state.lock() = terminal;
    shared.subscribers.write().remove(&id);
    tracing::debug!(subscription = id, state = ?terminal, "subscriber removed");
}

/// Stream of events for one subscriber. Ends once the subscription reaches a
/// terminal state; nothing is yielded after its context is cancelled.
pub struct Subscription<E> {
    id: u64,
    inner: ReceiverStream<E>,
    state: Arc<Mutex<SubscriptionState>>,
    ctx: ExecutionContext,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }
}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        if self.ctx.is_cancelled() {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    async fn wait_for_subscribers<E: Clone + Send + Sync + 'static>(
        broadcaster: &Broadcaster<E>,
        count: usize,
    ) {
        for _ in 0..100 {
            if broadcaster.subscriber_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscriber count never reached {count}");
    }

    #[test]
    fn sentinel_subscribes_to_everything() {
        assert_eq!(Filter::from_sentinel(-1), Filter::All);
        assert!(Filter::from_sentinel(-1).matches(&42));
        assert!(Filter::from_sentinel(5).matches(&5));
        assert!(!Filter::from_sentinel(5).matches(&7));
    }

    #[tokio::test]
    async fn filters_and_preserves_order() {
        let broadcaster = Broadcaster::<i64>::new(10);
        let ctx = ExecutionContext::new();
        let filter = Filter::from_sentinel(5);
        let mut only_five = broadcaster.subscribe(move |id| filter.matches(id), &ctx);
        let mut everything = broadcaster.subscribe(|_| true, &ctx);

        assert_eq!(broadcaster.broadcast(&5).delivered, 2);
        assert_eq!(broadcaster.broadcast(&7).delivered, 1);
        broadcaster.broadcast(&5);

        assert_eq!(only_five.next().await, Some(5));
        assert_eq!(only_five.next().await, Some(5));
        assert_eq!(everything.next().await, Some(5));
        assert_eq!(everything.next().await, Some(7));
        assert_eq!(everything.next().await, Some(5));
    }

    #[tokio::test]
    async fn greeting_comes_first() {
        let broadcaster = Broadcaster::<String>::new(10);
        let ctx = ExecutionContext::new();
        let mut events =
            broadcaster.subscribe_with_greeting(|_| true, "connected".to_string(), &ctx);
        broadcaster.broadcast(&"update".to_string());
        assert_eq!(events.next().await.as_deref(), Some("connected"));
        assert_eq!(events.next().await.as_deref(), Some("update"));
    }

    #[tokio::test]
    async fn full_queues_drop_events() {
        let broadcaster = Broadcaster::<i64>::new(1);
        let ctx = ExecutionContext::new();
        let _events = broadcaster.subscribe(|_| true, &ctx);
        let mut dropped = 0;
        for n in 0..20 {
            dropped += broadcaster.broadcast(&n).dropped;
        }
        assert!(dropped > 0);
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream_and_unregisters() {
        let broadcaster = Broadcaster::<i64>::new(10);
        let ctx = ExecutionContext::new();
        let mut events = broadcaster.subscribe(|_| true, &ctx);
        broadcaster.broadcast(&1);
        assert_eq!(events.next().await, Some(1));

        ctx.cancel();
        let publisher = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for n in 0..100 {
                    broadcaster.broadcast(&n);
                    tokio::task::yield_now().await;
                }
            })
        };
        assert_eq!(events.next().await, None);
        publisher.await.unwrap();
        wait_for_subscribers(&broadcaster, 0).await;
        assert_eq!(events.state(), SubscriptionState::ContextCancelled);
    }

    #[tokio::test]
    async fn dropping_the_stream_unregisters() {
        let broadcaster = Broadcaster::<i64>::new(10);
        let events = broadcaster.subscribe(|_| true, &ExecutionContext::new());
        wait_for_subscribers(&broadcaster, 1).await;
        drop(events);
        wait_for_subscribers(&broadcaster, 0).await;
    }

    #[tokio::test]
    async fn close_shuts_every_subscription() {
        let broadcaster = Broadcaster::<i64>::new(10);
        let ctx = ExecutionContext::new();
        let mut a = broadcaster.subscribe(|_| true, &ctx);
        let mut b = broadcaster.subscribe(|_| true, &ctx);
        broadcaster.close();
        assert_eq!(a.next().await, None);
        assert_eq!(b.next().await, None);
        assert_eq!(a.state(), SubscriptionState::ServerClosed);
        assert!(b.state().is_terminal());
    }
}
