//! Event broker.
//!
//! A single dispatch task owns the registry of subscriptions. Every other
//! task talks to it through channels:
//!
//! ```text
//! Subscription::drop ──► unsubscribe (unbounded) ─┐
//! Broker::subscribe  ──┐                          ├─► dispatch loop ─► try_send ─► Subscription
//! Broker::stats      ──┼─► commands (bounded) ────┘
//! Publisher::publish ──┘
//! ```
//!
//! Subscribe, stats and publish share one FIFO queue, so their relative
//! order is exactly the order the dispatcher accepted them. Unsubscribes are
//! polled first: an unsubscribe that completed before a publish was sent is
//! always applied before that publish is broadcast.
//!
//! Delivery never blocks the dispatcher. Each subscription has a bounded
//! buffer; when it is full the event is dropped for that subscriber only
//! and counted in [`BrokerStats::dropped`].

mod subscription;

pub use subscription::{Subscription, SubscriptionId};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::event::Event;

/// Counters maintained by the dispatch task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Currently registered subscriptions.
    pub subscribers: usize,
    /// Events accepted for broadcast.
    pub published: u64,
    /// Successful per-subscriber deliveries.
    pub delivered: u64,
    /// Per-subscriber deliveries dropped because the buffer was full.
    pub dropped: u64,
}

enum Command {
    Subscribe {
        events: mpsc::Sender<Arc<Event>>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },
    Publish(Arc<Event>),
    Shutdown,
}

/// Write-only side of the broker, handed to jobs and ingestion handlers.
#[derive(Clone, Debug)]
pub struct Publisher {
    commands: mpsc::Sender<Command>,
}

impl Publisher {
    /// Hand an event to the dispatcher, waiting while the publish queue is full.
    pub async fn publish(&self, event: Event) -> BrokerResult<()> {
        self.commands
            .send(Command::Publish(Arc::new(event)))
            .await
            .map_err(|_| BrokerError::Closed)
    }

    /// Hand an event to the dispatcher without waiting.
    pub fn try_publish(&self, event: Event) -> BrokerResult<()> {
        self.commands
            .try_send(Command::Publish(Arc::new(event)))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BrokerError::Full,
                mpsc::error::TrySendError::Closed(_) => BrokerError::Closed,
            })
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Subscribe { .. } => f.write_str("Subscribe"),
            Command::Stats { .. } => f.write_str("Stats"),
            Command::Publish(event) => write!(f, "Publish({})", event.id),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Handle to the dispatch task. Cheap to clone.
///
/// The dispatcher stops when [`Broker::shutdown`] is called or when every
/// `Broker` and [`Publisher`] handle has been dropped.
#[derive(Clone, Debug)]
pub struct Broker {
    publisher: Publisher,
    unsubscribe: mpsc::UnboundedSender<SubscriptionId>,
    subscriber_buffer: usize,
}

impl Broker {
    /// Spawn the dispatch task on the current tokio runtime.
    pub fn start(config: &BrokerConfig) -> Self {
        let subscriber_buffer = config.subscriber_buffer.max(1);
        let publish_queue = config.publish_queue.max(1);
        let (commands_tx, commands_rx) = mpsc::channel(publish_queue);
        let (unsubscribe_tx, unsubscribe_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            subscribers: HashMap::new(),
            next_id: 0,
            stats: BrokerStats::default(),
        };
        tokio::spawn(dispatcher.run(commands_rx, unsubscribe_rx));

        info!(subscriber_buffer, publish_queue, "Broker started");

        Self {
            publisher: Publisher {
                commands: commands_tx,
            },
            unsubscribe: unsubscribe_tx,
            subscriber_buffer,
        }
    }

    /// Register a new delivery channel.
    ///
    /// Resolves once the dispatcher applied the registration; every event
    /// accepted after that is delivered to the returned subscription.
    pub async fn subscribe(&self) -> BrokerResult<Subscription> {
        let (events_tx, events_rx) = mpsc::channel(self.subscriber_buffer);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.publisher
            .commands
            .send(Command::Subscribe {
                events: events_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BrokerError::Closed)?;
        let id = reply_rx.await.map_err(|_| BrokerError::Closed)?;

        Ok(Subscription::new(id, events_rx, self.unsubscribe.clone()))
    }

    /// Remove a subscription from the registry.
    ///
    /// Safe to call repeatedly or for ids that are already gone. Dropping
    /// the [`Subscription`] has the same effect.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.unsubscribe.send(id);
    }

    pub async fn publish(&self, event: Event) -> BrokerResult<()> {
        self.publisher.publish(event).await
    }

    pub fn try_publish(&self, event: Event) -> BrokerResult<()> {
        self.publisher.try_publish(event)
    }

    /// Write-only handle for producers.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Snapshot the dispatcher's counters.
    pub async fn stats(&self) -> BrokerResult<BrokerStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.publisher
            .commands
            .send(Command::Stats { reply: reply_tx })
            .await
            .map_err(|_| BrokerError::Closed)?;
        reply_rx.await.map_err(|_| BrokerError::Closed)
    }

    /// Stop the dispatcher after everything already queued is processed,
    /// and wait until it has stopped.
    ///
    /// All subscriptions end (their `recv` returns `None`), which lets
    /// open streams finish.
    pub async fn shutdown(&self) {
        let commands = &self.publisher.commands;
        if commands.send(Command::Shutdown).await.is_ok() {
            commands.closed().await;
        }
    }
}

/// State owned by the dispatch task. Nothing else can reach it.
struct Dispatcher {
    subscribers: HashMap<SubscriptionId, mpsc::Sender<Arc<Event>>>,
    next_id: u64,
    stats: BrokerStats,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut unsubscribe: mpsc::UnboundedReceiver<SubscriptionId>,
    ) {
        loop {
            tokio::select! {
                biased;

                Some(id) = unsubscribe.recv() => self.remove(id),

                command = commands.recv() => match command {
                    Some(Command::Subscribe { events, reply }) => self.add(events, reply),
                    Some(Command::Stats { reply }) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::Publish(event)) => {
                        // An unsubscribe may have landed after the poll above.
                        while let Ok(id) = unsubscribe.try_recv() {
                            self.remove(id);
                        }
                        self.broadcast(event);
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        info!(
            subscribers = self.subscribers.len(),
            published = self.stats.published,
            dropped = self.stats.dropped,
            "Broker stopped"
        );
    }

    fn add(&mut self, events: mpsc::Sender<Arc<Event>>, reply: oneshot::Sender<SubscriptionId>) {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        // The subscriber gave up waiting; don't register a dead channel.
        if reply.send(id).is_err() {
            return;
        }

        self.subscribers.insert(id, events);
        debug!(%id, subscribers = self.subscribers.len(), "Subscription added");
    }

    fn remove(&mut self, id: SubscriptionId) {
        if self.subscribers.remove(&id).is_some() {
            debug!(%id, subscribers = self.subscribers.len(), "Subscription removed");
        }
    }

    fn broadcast(&mut self, event: Arc<Event>) {
        let Dispatcher {
            subscribers, stats, ..
        } = self;
        stats.published += 1;

        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&event)) {
            Ok(()) => {
                stats.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                stats.dropped += 1;
                warn!(%id, event_id = %event.id, "Subscriber buffer full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%id, "Subscriber gone, removing");
                false
            }
        });
    }

    fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            subscribers: self.subscribers.len(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn broker_with_buffer(subscriber_buffer: usize) -> Broker {
        Broker::start(&BrokerConfig {
            subscriber_buffer,
            publish_queue: 64,
        })
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        for n in 0..5 {
            let broker = broker_with_buffer(8);
            let mut subs = Vec::new();
            for _ in 0..n {
                subs.push(broker.subscribe().await.unwrap());
            }

            broker
                .publish(Event::widget("w1", body(json!({"value": 1}))))
                .await
                .unwrap();
            // Stats is queued behind the publish, so the broadcast is done.
            let stats = broker.stats().await.unwrap();
            assert_eq!(stats.subscribers, n);
            assert_eq!(stats.delivered, n as u64);

            for sub in subs.iter_mut() {
                let event = sub.try_recv().unwrap();
                assert_eq!(event.id, "w1");
                assert!(sub.try_recv().is_err());
            }
        }
    }

    #[tokio::test]
    async fn test_subscribe_after_publish_sees_nothing() {
        let broker = broker_with_buffer(8);
        broker
            .publish(Event::widget("early", Map::new()))
            .await
            .unwrap();

        let mut late = broker.subscribe().await.unwrap();
        broker.stats().await.unwrap();
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_before_publish_is_observed() {
        let broker = broker_with_buffer(8);
        let mut a = broker.subscribe().await.unwrap();
        let mut b = broker.subscribe().await.unwrap();

        broker.unsubscribe(a.id());
        broker
            .publish(Event::widget("w1", Map::new()))
            .await
            .unwrap();

        assert_eq!(b.recv().await.unwrap().id, "w1");
        // Registry dropped a's sender, so the channel ends empty.
        assert!(a.recv().await.is_none());
        assert_eq!(broker.stats().await.unwrap().subscribers, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unsubscribe_then_publish_never_delivers_across_threads() {
        let broker = broker_with_buffer(8);
        for i in 0..500 {
            let mut sub = broker.subscribe().await.unwrap();
            broker.unsubscribe(sub.id());
            broker
                .publish(Event::widget(format!("e{i}"), Map::new()))
                .await
                .unwrap();
            assert!(sub.recv().await.is_none(), "event {i} reached a removed subscription");
        }
        assert_eq!(broker.stats().await.unwrap().delivered, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broker = broker_with_buffer(8);
        let sub = broker.subscribe().await.unwrap();
        let id = sub.id();

        broker.unsubscribe(id);
        broker.unsubscribe(id);
        drop(sub);

        assert_eq!(broker.stats().await.unwrap().subscribers, 0);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let broker = broker_with_buffer(8);
        let first = broker.subscribe().await.unwrap();
        let mut second = broker.subscribe().await.unwrap();
        drop(first);

        broker
            .publish(Event::widget("w2", Map::new()))
            .await
            .unwrap();

        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.subscribers, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(second.recv().await.unwrap().id, "w2");
    }

    #[tokio::test]
    async fn test_concurrent_producers_share_one_order() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 50;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let broker = broker_with_buffer(TOTAL);
        let mut subs = Vec::new();
        for _ in 0..3 {
            subs.push(broker.subscribe().await.unwrap());
        }

        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let publisher = broker.publisher();
            handles.push(tokio::spawn(async move {
                for i in 0..PER_PRODUCER {
                    let event = Event::widget(format!("{p}-{i}"), body(json!({"seq": i})));
                    publisher.publish(event).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut orders = Vec::new();
        for sub in subs.iter_mut() {
            let mut ids = Vec::with_capacity(TOTAL);
            for _ in 0..TOTAL {
                ids.push(sub.recv().await.unwrap().id.clone());
            }
            orders.push(ids);
        }

        assert_eq!(orders[0], orders[1]);
        assert_eq!(orders[1], orders[2]);

        // Each producer's own events keep their order.
        for p in 0..PRODUCERS {
            let prefix = format!("{p}-");
            let seq: Vec<usize> = orders[0]
                .iter()
                .filter_map(|id| id.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..PER_PRODUCER).collect::<Vec<_>>());
        }

        assert_eq!(broker.stats().await.unwrap().dropped, 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_stall_others() {
        let broker = broker_with_buffer(4);
        let _slow = broker.subscribe().await.unwrap();
        let mut fast = broker.subscribe().await.unwrap();

        for i in 0..10 {
            broker
                .publish(Event::widget(format!("e{i}"), Map::new()))
                .await
                .unwrap();
            assert_eq!(fast.recv().await.unwrap().id, format!("e{i}"));
        }

        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.published, 10);
        assert_eq!(stats.delivered, 14);
        assert_eq!(stats.dropped, 6);
        assert_eq!(stats.subscribers, 2);
    }

    #[tokio::test]
    async fn test_try_publish_full_queue() {
        let broker = Broker::start(&BrokerConfig {
            subscriber_buffer: 1,
            publish_queue: 1,
        });
        // Fill the queue faster than the dispatcher can be scheduled on
        // this single-threaded runtime.
        let mut saw_full = false;
        for i in 0..8 {
            match broker.try_publish(Event::widget(format!("e{i}"), Map::new())) {
                Ok(()) => {}
                Err(BrokerError::Full) => saw_full = true,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(saw_full);
    }

    #[tokio::test]
    async fn test_zero_sizes_are_clamped_to_one() {
        let broker = Broker::start(&BrokerConfig {
            subscriber_buffer: 0,
            publish_queue: 0,
        });
        let mut sub = broker.subscribe().await.unwrap();

        broker.publish(Event::widget("a", Map::new())).await.unwrap();
        broker.publish(Event::widget("b", Map::new())).await.unwrap();

        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(sub.recv().await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriptions() {
        let broker = broker_with_buffer(8);
        let mut sub = broker.subscribe().await.unwrap();

        broker.shutdown().await;

        assert!(sub.recv().await.is_none());
        assert_eq!(broker.subscribe().await.unwrap_err(), BrokerError::Closed);
        assert_eq!(
            broker.publish(Event::widget("late", Map::new())).await,
            Err(BrokerError::Closed)
        );
    }

    #[tokio::test]
    async fn test_event_body_is_shared_not_copied() {
        let broker = broker_with_buffer(8);
        let mut a = broker.subscribe().await.unwrap();
        let mut b = broker.subscribe().await.unwrap();

        broker
            .publish(Event::dashboard("main", body(json!({"reload": true}))))
            .await
            .unwrap();

        let ea = a.recv().await.unwrap();
        let eb = b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&ea, &eb));
        assert_eq!(ea.target, crate::event::DASHBOARDS_TARGET);
    }
}
