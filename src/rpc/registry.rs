//! The Response Subscription Registry: lazily creates and caches one reply
//! queue + consumer per response type, serialized by a single async mutex.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::broker::{Broker, QueueSpec};
use super::convention::NamingConvention;
use super::error::RpcError;
use super::pending::PendingTable;
use super::types::DEFAULT_EXCHANGE;

/// Identity of a subscription slot: the pair (request-payload-type, response-payload-type).
///
/// Keyed by the pair, so two request types that share a response type get independent reply
/// queues and consumers rather than sharing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpcKey {
    /// Name of the request payload type.
    pub request_type: String,
    /// Name of the response payload type.
    pub response_type: String,
}

/// A cached reply queue + consumer for one [`RpcKey`].
#[derive(Clone)]
struct Subscription {
    /// Reply queue name.
    queue_name: String,
    /// Stops the reply consumer when dropped or closed.
    stop: CancellationToken,
}

/// Serializes subscription creation across all keys under one async mutex; lookup is
/// lock-free via an [`ArcSwap`] snapshot.
pub struct SubscriptionRegistry<B: Broker> {
    broker: B,
    pending: PendingTable,
    snapshot: ArcSwap<HashMap<RpcKey, Subscription>>,
    create_lock: Mutex<()>,
}

impl<B: Broker> SubscriptionRegistry<B> {
    /// Create an empty registry over the given broker adapter and pending-request table.
    #[must_use]
    pub fn new(broker: B, pending: PendingTable) -> Self {
        Self {
            broker,
            pending,
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    /// Ensure a reply queue + consumer exists for `key`, creating one if absent, and return
    /// its queue name.
    #[instrument(skip_all, fields(request_type = %key.request_type, response_type = %key.response_type))]
    pub async fn ensure_reply_queue(
        &self,
        key: RpcKey,
        naming: &dyn NamingConvention,
        prefetch: u16,
        cancel: CancellationToken,
    ) -> Result<String, RpcError> {
        // Step 1: lock-free lookup.
        if let Some(sub) = self.snapshot.load().get(&key) {
            return Ok(sub.queue_name.clone());
        }

        // Step 2: acquire the registry's async mutex, cancellably.
        let _guard = tokio::select! {
            guard = self.create_lock.lock() => guard,
            () = cancel.cancelled() => return Err(RpcError::Cancelled),
        };

        // Re-check: another caller may have created it while we waited for the lock.
        if let Some(sub) = self.snapshot.load().get(&key) {
            return Ok(sub.queue_name.clone());
        }

        // Step 3: declare the reply queue. Non-durable, exclusive, auto-delete so the broker
        // reclaims it on channel/connection loss.
        let conventional_name = naming.rpc_return_queue(&key.response_type);
        let declared = self
            .broker
            .declare_queue(QueueSpec {
                name: if conventional_name.is_empty() {
                    None
                } else {
                    Some(conventional_name.as_str())
                },
                durable: false,
                exclusive: true,
                auto_delete: true,
                expires: None,
                arguments: Default::default(),
            })
            .await?;
        let queue_name = declared.name;

        // Step 4: bind to the reply exchange unless it is the broker default.
        let reply_exchange = naming.rpc_response_exchange(&key.response_type);
        if reply_exchange != DEFAULT_EXCHANGE {
            self.broker.declare_exchange(&reply_exchange, false).await?;
            self.broker
                .bind(&queue_name, &reply_exchange, &queue_name)
                .await?;
        }

        // Step 5: start the reply consumer.
        let mut consumer = self.broker.consume(&queue_name, prefetch).await?;
        let stop = CancellationToken::new();
        let consumer_stop = stop.clone();
        let pending = self.pending.clone();
        let queue_name_for_task = queue_name.clone();
        tokio::spawn(async move {
            info!(queue = %queue_name_for_task, "reply consumer started");
            loop {
                tokio::select! {
                    () = consumer_stop.cancelled() => break,
                    delivery = consumer.next() => {
                        let Some(delivery) = delivery else { break };
                        let Some(correlation_id) = delivery.correlation_id.clone() else {
                            debug!("reply delivery missing correlation id, dropping");
                            delivery.ack();
                            continue;
                        };
                        match pending.try_remove(&correlation_id) {
                            Some(action) => {
                                action.succeed(delivery);
                            }
                            None => {
                                debug!(%correlation_id, "no pending request for reply, dropping");
                                delivery.ack();
                            }
                        }
                    }
                }
            }
            consumer.close();
            info!(queue = %queue_name_for_task, "reply consumer stopped");
        });

        // Step 6: insert into the registry and release the mutex (dropped with `_guard`).
        let mut updated = (**self.snapshot.load()).clone();
        updated.insert(
            key,
            Subscription {
                queue_name: queue_name.clone(),
                stop,
            },
        );
        self.snapshot.store(Arc::new(updated));

        Ok(queue_name)
    }

    /// Snapshot-and-clear the registry, closing every cached subscription's consumer.
    pub async fn invalidate_all(&self) {
        let drained = self.snapshot.swap(Arc::new(HashMap::new()));
        for sub in drained.values() {
            sub.stop.cancel();
        }
    }

    /// Number of cached subscriptions. Exposed for tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Whether the registry currently caches no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}
