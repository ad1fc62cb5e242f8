//! The broker adapter contract. The RPC engine is generic over this trait so that
//! tests can substitute [`crate::rpc::mock_broker::MockBroker`] for a real `lapin` connection.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

use super::error::BrokerError;
use super::types::{CorrelationId, DeliveryMode, Headers, RecoveryEvent};

/// Parameters for declaring a queue.
#[derive(Debug, Clone)]
pub struct QueueSpec<'a> {
    /// Queue name, or `None` to let the broker assign one.
    pub name: Option<&'a str>,
    /// Whether the queue survives a broker restart.
    pub durable: bool,
    /// Whether the queue is private to the declaring connection.
    pub exclusive: bool,
    /// Whether the broker deletes the queue once its last consumer disconnects.
    pub auto_delete: bool,
    /// Optional TTL after which an unused queue is reclaimed by the broker.
    pub expires: Option<Duration>,
    /// Additional declare arguments.
    pub arguments: Headers,
}

/// Result of declaring a queue: the broker may assign the name.
#[derive(Debug, Clone)]
pub struct DeclaredQueue {
    /// The server-assigned (or conventional) queue name.
    pub name: String,
}

/// Parameters for publishing a message.
#[derive(Debug, Clone)]
pub struct PublishSpec {
    /// `reply-to` property.
    pub reply_to: Option<String>,
    /// `correlation-id` property.
    pub correlation_id: Option<CorrelationId>,
    /// Message priority, 0-255.
    pub priority: u8,
    /// Message headers.
    pub headers: Headers,
    /// Delivery mode.
    pub delivery_mode: DeliveryMode,
    /// Expiration, absent for infinite.
    pub expiration: Option<Duration>,
    /// Whether the publish is mandatory.
    pub mandatory: bool,
    /// Serialized message body.
    pub body: Vec<u8>,
}

/// The caller's decision once it has finished processing a [`BrokerDelivery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Acknowledge the delivery.
    Ack,
    /// Reject the delivery; the broker applies its own redelivery/dead-lettering policy.
    Nack,
}

/// A single inbound message handed to a consumer.
#[derive(Debug)]
pub struct BrokerDelivery {
    /// Raw message body.
    pub body: Vec<u8>,
    /// `correlation-id` property, if set.
    pub correlation_id: Option<CorrelationId>,
    /// `reply-to` property, if set.
    pub reply_to: Option<String>,
    /// Message headers.
    pub headers: Headers,
    /// Channel the consumer uses to ack/nack this delivery.
    ack_tx: Option<oneshot::Sender<AckDecision>>,
}

impl BrokerDelivery {
    /// Build a new delivery paired with the receiving half used to observe the ack decision.
    #[must_use]
    pub fn new(
        body: Vec<u8>,
        correlation_id: Option<CorrelationId>,
        reply_to: Option<String>,
        headers: Headers,
    ) -> (Self, oneshot::Receiver<AckDecision>) {
        let (ack_tx, ack_rx) = oneshot::channel();
        (
            Self {
                body,
                correlation_id,
                reply_to,
                headers,
                ack_tx: Some(ack_tx),
            },
            ack_rx,
        )
    }

    /// Acknowledge this delivery.
    pub fn ack(mut self) {
        if let Some(tx) = self.ack_tx.take() {
            let _ = tx.send(AckDecision::Ack);
        }
    }

    /// Reject this delivery.
    pub fn nack(mut self) {
        if let Some(tx) = self.ack_tx.take() {
            let _ = tx.send(AckDecision::Nack);
        }
    }
}

/// A running consumer: a stream of deliveries plus a handle to stop it.
pub struct BrokerConsumer {
    /// Inbound delivery stream.
    receiver: tokio::sync::mpsc::Receiver<BrokerDelivery>,
    /// Cancelled to stop the consumer and release broker-side resources.
    stop: tokio_util::sync::CancellationToken,
}

impl BrokerConsumer {
    /// Build a consumer from its receiving half and a stop token the adapter observes.
    #[must_use]
    pub fn new(
        receiver: tokio::sync::mpsc::Receiver<BrokerDelivery>,
        stop: tokio_util::sync::CancellationToken,
    ) -> Self {
        Self { receiver, stop }
    }

    /// Wait for the next delivery. Returns `None` once the consumer has been closed and
    /// drained.
    pub async fn next(&mut self) -> Option<BrokerDelivery> {
        self.receiver.recv().await
    }

    /// Stop the consumer. Idempotent.
    pub fn close(&self) {
        self.stop.cancel();
    }
}

/// External broker collaborator the engine is generic over.
///
/// Implementations: [`crate::rpc::lapin_broker::LapinBroker`] for production use,
/// [`crate::rpc::mock_broker::MockBroker`] for tests.
#[async_trait]
pub trait Broker: Clone + Send + Sync + 'static {
    /// Declare a direct exchange.
    async fn declare_exchange(&self, name: &str, durable: bool) -> Result<(), BrokerError>;

    /// Declare a queue.
    async fn declare_queue(&self, spec: QueueSpec<'_>) -> Result<DeclaredQueue, BrokerError>;

    /// Bind a queue to an exchange under a routing key.
    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str)
        -> Result<(), BrokerError>;

    /// Publish a message to an exchange.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        publish: PublishSpec,
    ) -> Result<(), BrokerError>;

    /// Start consuming a queue with the given prefetch count.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<BrokerConsumer, BrokerError>;

    /// Subscribe to connection-recovered events.
    fn on_recovery(&self) -> broadcast::Receiver<RecoveryEvent>;
}
