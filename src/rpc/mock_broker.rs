//! In-memory [`Broker`] test double: simulates direct-exchange routing without a live
//! RabbitMQ, so the engine's tests can run callback-free and deterministic save for the
//! scheduling `tokio` itself introduces.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::broker::{AckDecision, Broker, BrokerConsumer, BrokerDelivery, DeclaredQueue, PublishSpec, QueueSpec};
use super::error::BrokerError;
use super::types::RecoveryEvent;

const DELIVERY_CHANNEL_CAPACITY: usize = 256;

/// One published message and the exchange/routing key it was addressed to, recorded for
/// assertions in tests.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// The publish parameters, including body and properties.
    pub spec: PublishSpec,
}

struct QueueState {
    sender: mpsc::Sender<BrokerDelivery>,
}

#[derive(Default)]
struct Inner {
    exchanges: HashMap<String, bool>,
    bindings: HashMap<(String, String), Vec<String>>,
    queues: HashMap<String, QueueState>,
    queue_counter: u64,
    published: Vec<PublishedMessage>,
}

/// In-memory broker. Every declared queue is a direct-delivery `mpsc` channel; publishing to
/// the default (nameless) exchange delivers straight to the queue of the same name, and
/// publishing to a declared exchange fans out to every queue bound under the matching
/// routing key.
#[derive(Clone)]
pub struct MockBroker {
    inner: Arc<Mutex<Inner>>,
    recovery_tx: broadcast::Sender<RecoveryEvent>,
}

impl MockBroker {
    /// Create an empty mock broker.
    #[must_use]
    pub fn new() -> Self {
        let (recovery_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            recovery_tx,
        }
    }

    /// Manually emit a recovery event, simulating a connection loss and recovery.
    pub fn emit_recovery(&self, event: RecoveryEvent) {
        let _ = self.recovery_tx.send(event);
    }

    /// Every message published so far, in publish order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.inner.lock().await.published.clone()
    }

    /// Number of declared exchanges. Exposed for tests asserting idempotent declaration.
    pub async fn exchange_count(&self) -> usize {
        self.inner.lock().await.exchanges.len()
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn declare_exchange(&self, name: &str, durable: bool) -> Result<(), BrokerError> {
        self.inner
            .lock()
            .await
            .exchanges
            .entry(name.to_string())
            .or_insert(durable);
        Ok(())
    }

    async fn declare_queue(&self, spec: QueueSpec<'_>) -> Result<DeclaredQueue, BrokerError> {
        let mut inner = self.inner.lock().await;
        let name = match spec.name {
            Some(name) => name.to_string(),
            None => {
                inner.queue_counter += 1;
                format!("amq.gen-{}", inner.queue_counter)
            }
        };
        if !inner.queues.contains_key(&name) {
            let (sender, _receiver) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
            inner.queues.insert(name.clone(), QueueState { sender });
        }
        Ok(DeclaredQueue { name })
    }

    async fn bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner
            .bindings
            .entry((exchange.to_string(), routing_key.to_string()))
            .or_default()
            .push(queue.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        publish: PublishSpec,
    ) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            spec: publish.clone(),
        });

        let targets: Vec<String> = if exchange.is_empty() {
            vec![routing_key.to_string()]
        } else {
            inner
                .bindings
                .get(&(exchange.to_string(), routing_key.to_string()))
                .cloned()
                .unwrap_or_default()
        };

        for queue in targets {
            if let Some(state) = inner.queues.get(&queue) {
                let (delivery, _ack_rx) = BrokerDelivery::new(
                    publish.body.clone(),
                    publish.correlation_id.clone(),
                    publish.reply_to.clone(),
                    publish.headers.clone(),
                );
                let sender = state.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(delivery).await;
                });
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, _prefetch: u16) -> Result<BrokerConsumer, BrokerError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (sender, _receiver) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
                QueueState { sender }
            });

        // Replace the queue's sender with a fresh pair so this consumer owns the receiving
        // half; an already-bound queue keeps routing to the new pair going forward.
        let (sender, receiver) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
        state.sender = sender;

        Ok(BrokerConsumer::new(receiver, CancellationToken::new()))
    }

    fn on_recovery(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.recovery_tx.subscribe()
    }
}
