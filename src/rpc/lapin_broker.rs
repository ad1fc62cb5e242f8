//! Production [`Broker`] adapter over two `lapin` connections: a pooled `producer`
//! connection backs declare/bind/publish, a dedicated `consumer` connection backs
//! `consume`. Splitting them means a producer-channel error and a consumer-channel error
//! are reported as distinct [`RecoveryEventKind`]s, matching what the engine needs to tell
//! apart.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, ByteArray, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::broker::{AckDecision, Broker, BrokerConsumer, BrokerDelivery, DeclaredQueue, PublishSpec, QueueSpec};
use super::error::BrokerError;
use super::types::{DeliveryMode, HeaderValue, Headers, RecoveryEvent, RecoveryEventKind};

const RECOVERY_CHANNEL_CAPACITY: usize = 16;
const DELIVERY_CHANNEL_CAPACITY: usize = 256;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const XARGS_EXPIRES: &str = "x-expires";

/// Connects two independent `lapin` connections under one adapter.
#[derive(Clone)]
pub struct LapinBroker {
    uri: Arc<String>,
    app_id: Arc<String>,
    producer: Arc<ArcSwap<Connection>>,
    consumer: Arc<ArcSwap<Connection>>,
    recovery_tx: broadcast::Sender<RecoveryEvent>,
}

impl LapinBroker {
    /// Connect both connections and start their reconnect-on-error watchers.
    pub async fn connect(
        uri: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let uri = Arc::new(uri.into());
        let app_id = Arc::new(app_id.into());
        let (recovery_tx, _) = broadcast::channel(RECOVERY_CHANNEL_CAPACITY);

        let producer = Arc::new(ArcSwap::from_pointee(
            connect_one(&uri, &app_id, "producer")
                .await
                .map_err(BrokerError::DeclareExchange)?,
        ));
        let consumer = Arc::new(ArcSwap::from_pointee(
            connect_one(&uri, &app_id, "consumer")
                .await
                .map_err(BrokerError::Consume)?,
        ));

        spawn_recovery_watcher(
            uri.clone(),
            app_id.clone(),
            "producer",
            RecoveryEventKind::Producer,
            producer.clone(),
            recovery_tx.clone(),
        );
        spawn_recovery_watcher(
            uri.clone(),
            app_id.clone(),
            "consumer",
            RecoveryEventKind::Consumer,
            consumer.clone(),
            recovery_tx.clone(),
        );

        Ok(Self {
            uri,
            app_id,
            producer,
            consumer,
            recovery_tx,
        })
    }

    async fn producer_channel(&self) -> Result<lapin::Channel, lapin::Error> {
        self.producer.load().create_channel().await
    }
}

async fn connect_one(uri: &str, app_id: &str, kind: &str) -> Result<Connection, anyhow::Error> {
    let name = format!("{app_id}-{kind}");
    Connection::connect(uri, ConnectionProperties::default().with_connection_name(name.into()))
        .await
        .map_err(anyhow::Error::from)
}

/// Watch a connection for errors, reconnect with a fixed backoff, and publish a
/// [`RecoveryEvent`] of `kind` once reconnection succeeds.
fn spawn_recovery_watcher(
    uri: Arc<String>,
    app_id: Arc<String>,
    label: &'static str,
    kind: RecoveryEventKind,
    slot: Arc<ArcSwap<Connection>>,
    recovery_tx: broadcast::Sender<RecoveryEvent>,
) {
    tokio::spawn(async move {
        loop {
            let (err_tx, mut err_rx) = mpsc::unbounded_channel::<lapin::Error>();
            slot.load().on_error(move |err| {
                let _ = err_tx.send(err);
            });

            let Some(err) = err_rx.recv().await else {
                break;
            };
            warn!(%label, "{label} connection errored: {err}, reconnecting");

            loop {
                match connect_one(&uri, &app_id, label).await {
                    Ok(conn) => {
                        slot.store(Arc::new(conn));
                        info!(%label, "{label} connection recovered");
                        let _ = recovery_tx.send(RecoveryEvent { kind });
                        break;
                    }
                    Err(err) => {
                        error!(%label, "reconnecting {label} connection failed: {err}");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        }
    });
}

fn headers_to_field_table(headers: &Headers) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        let amqp_value = match value {
            HeaderValue::Bool(b) => AMQPValue::Boolean(*b),
            HeaderValue::Bytes(bytes) => AMQPValue::ByteArray(ByteArray::from(bytes.clone())),
            HeaderValue::String(s) => AMQPValue::LongString(LongString::from(s.clone())),
        };
        table.insert(key.as_str().into(), amqp_value);
    }
    table
}

fn field_table_to_headers(table: &FieldTable) -> Headers {
    let mut headers = Headers::new();
    for (key, value) in table.inner() {
        let header_value = match value {
            AMQPValue::Boolean(b) => HeaderValue::Bool(*b),
            AMQPValue::LongString(s) => HeaderValue::String(s.to_string()),
            AMQPValue::ShortString(s) => HeaderValue::String(s.to_string()),
            AMQPValue::ByteArray(bytes) => HeaderValue::Bytes(bytes.as_slice().to_vec()),
            other => HeaderValue::String(format!("{other:?}")),
        };
        headers.insert(key.to_string(), header_value);
    }
    headers
}

#[async_trait]
impl Broker for LapinBroker {
    async fn declare_exchange(&self, name: &str, durable: bool) -> Result<(), BrokerError> {
        let chan = self
            .producer_channel()
            .await
            .map_err(|err| BrokerError::DeclareExchange(err.into()))?;
        chan.exchange_declare(
            name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                auto_delete: false,
                durable,
                internal: false,
                nowait: false,
                passive: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|err| BrokerError::DeclareExchange(err.into()))
    }

    async fn declare_queue(&self, spec: QueueSpec<'_>) -> Result<DeclaredQueue, BrokerError> {
        let chan = self
            .producer_channel()
            .await
            .map_err(|err| BrokerError::DeclareQueue(err.into()))?;

        let mut args = headers_to_field_table(&spec.arguments);
        if let Some(expires) = spec.expires {
            let millis: u32 = expires
                .as_millis()
                .try_into()
                .map_err(|err: std::num::TryFromIntError| BrokerError::DeclareQueue(err.into()))?;
            args.insert(XARGS_EXPIRES.into(), AMQPValue::LongUInt(millis));
        }

        let queue = chan
            .queue_declare(
                spec.name.unwrap_or_default(),
                QueueDeclareOptions {
                    auto_delete: spec.auto_delete,
                    durable: spec.durable,
                    exclusive: spec.exclusive,
                    nowait: false,
                    passive: false,
                },
                args,
            )
            .await
            .map_err(|err| BrokerError::DeclareQueue(err.into()))?;

        Ok(DeclaredQueue {
            name: queue.name().as_str().to_string(),
        })
    }

    async fn bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let chan = self
            .producer_channel()
            .await
            .map_err(|err| BrokerError::Bind(err.into()))?;
        chan.queue_bind(
            queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|err| BrokerError::Bind(err.into()))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        publish: PublishSpec,
    ) -> Result<(), BrokerError> {
        let chan = self
            .producer_channel()
            .await
            .map_err(|err| BrokerError::Publish(err.into()))?;

        let mut props = BasicProperties::default()
            .with_app_id(self.app_id.to_string().into())
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_priority(publish.priority)
            .with_delivery_mode(match publish.delivery_mode {
                DeliveryMode::Persistent => 2,
                DeliveryMode::NonPersistent => 1,
            })
            .with_headers(headers_to_field_table(&publish.headers));
        if let Some(reply_to) = publish.reply_to {
            props = props.with_reply_to(ShortString::from(reply_to));
        }
        if let Some(correlation_id) = publish.correlation_id {
            props = props.with_correlation_id(ShortString::from(correlation_id));
        }
        if let Some(expiration) = publish.expiration {
            props = props.with_expiration(ShortString::from(expiration.as_millis().to_string()));
        }

        chan.basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions {
                immediate: false,
                mandatory: publish.mandatory,
            },
            &publish.body,
            props,
        )
        .await
        .map_err(|err| BrokerError::Publish(err.into()))?;
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<BrokerConsumer, BrokerError> {
        let chan = self
            .consumer
            .load()
            .create_channel()
            .await
            .map_err(|err| BrokerError::Consume(err.into()))?;
        chan.basic_qos(prefetch, BasicQosOptions { global: false })
            .await
            .map_err(|err| BrokerError::Consume(err.into()))?;

        let consumer_tag = format!("{}-{}", self.app_id, Uuid::new_v4());
        let mut lapin_consumer = chan
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    exclusive: false,
                    no_ack: false,
                    no_local: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| BrokerError::Consume(err.into()))?;

        let (tx, rx) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
        let stop = tokio_util::sync::CancellationToken::new();
        let task_stop = stop.clone();

        tokio::spawn(async move {
            use futures::StreamExt;
            loop {
                tokio::select! {
                    () = task_stop.cancelled() => break,
                    delivery_result = lapin_consumer.next() => {
                        let Some(delivery_result) = delivery_result else { break };
                        let delivery = match delivery_result {
                            Ok(delivery) => delivery,
                            Err(err) => {
                                error!("consumer delivery failed: {err}");
                                break;
                            }
                        };
                        let correlation_id = delivery
                            .properties
                            .correlation_id()
                            .as_ref()
                            .map(ToString::to_string);
                        let reply_to = delivery
                            .properties
                            .reply_to()
                            .as_ref()
                            .map(ToString::to_string);
                        let headers = delivery
                            .properties
                            .headers()
                            .as_ref()
                            .map(field_table_to_headers)
                            .unwrap_or_default();
                        let body = delivery.data.clone();
                        let (broker_delivery, ack_rx) =
                            BrokerDelivery::new(body, correlation_id, reply_to, headers);
                        if tx.send(broker_delivery).await.is_err() {
                            break;
                        }
                        tokio::spawn(async move {
                            match ack_rx.await {
                                Ok(AckDecision::Ack) => {
                                    if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                                        error!("acking delivery failed: {err}");
                                    }
                                }
                                Ok(AckDecision::Nack) | Err(_) => {
                                    if let Err(err) = delivery.nack(BasicNackOptions::default()).await {
                                        error!("nacking delivery failed: {err}");
                                    }
                                }
                            }
                        });
                    }
                }
            }
        });

        Ok(BrokerConsumer::new(rx, stop))
    }

    fn on_recovery(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.recovery_tx.subscribe()
    }
}
