//! The Responder Host: declares a request exchange/queue/binding for a request
//! type, consumes messages, invokes the user's responder, and publishes a reply or fault.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::broker::{Broker, BrokerDelivery, PublishSpec, QueueSpec};
use super::config::{Config, ResponderConfig};
use super::convention::{NamingConvention, QueueTypeHint, TypeNameSerializer, TypeNamed};
use super::error::RpcError;
use super::types::{DeliveryMode, HeaderValue, Headers, DEFAULT_EXCHANGE, HEADER_EXCEPTION_MESSAGE, HEADER_IS_FAULTED};

/// Hard cap the broker's header-length limit imposes on a serialized response type name.
const MAX_RESPONSE_TYPE_NAME_BYTES: usize = 255;

/// A responder returns this to signal it was cancelled rather than failed, so
/// [`handle_message`] can tell the two apart: no reply is published when the responder's own
/// cancellation fires while the delivery's cancellation is also cancelled.
#[derive(Debug, Default)]
pub struct ResponderCancelled;

impl std::fmt::Display for ResponderCancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("responder was cancelled")
    }
}

impl std::error::Error for ResponderCancelled {}

/// Handle to a running responder. Closing it stops the consumer but leaves the request
/// queue and exchange declared.
pub struct SubscriptionHandle {
    stop: CancellationToken,
}

impl SubscriptionHandle {
    /// Stop the consumer. Idempotent; does not delete broker resources.
    pub fn close(&self) {
        self.stop.cancel();
    }
}

/// Validates a response type's serialized name against the broker's header-length limit.
/// Runs before any broker declaration.
fn validate_response_type<Resp: TypeNamed>(
    type_names: &dyn TypeNameSerializer,
) -> Result<(), RpcError> {
    validate_type_name_bytes(type_names, &Resp::type_name())
}

fn validate_type_name_bytes(
    type_names: &dyn TypeNameSerializer,
    type_name: &super::convention::TypeName,
) -> Result<(), RpcError> {
    let serialized = type_names.serialize(type_name);
    if serialized.len() > MAX_RESPONSE_TYPE_NAME_BYTES {
        return Err(RpcError::ArgumentOutOfRange);
    }
    Ok(())
}

/// Builds and runs a responder for one request type against one broker adapter.
pub(super) struct Responder<B: Broker> {
    broker: B,
    config: Config,
    naming: Arc<dyn NamingConvention>,
    type_names: Arc<dyn TypeNameSerializer>,
}

impl<B: Broker> Responder<B> {
    /// Create a responder builder bound to a broker adapter, bus-wide config, naming
    /// convention and type-name serializer.
    pub fn new(
        broker: B,
        config: Config,
        naming: Arc<dyn NamingConvention>,
        type_names: Arc<dyn TypeNameSerializer>,
    ) -> Self {
        Self {
            broker,
            config,
            naming,
            type_names,
        }
    }

    /// Declare the request exchange/queue/binding for `Req` and start consuming, invoking
    /// `responder` for every inbound message.
    #[instrument(skip_all, fields(request_type = %Req::type_name(), response_type = %Resp::type_name()))]
    pub async fn host<Req, Resp, F, Fut>(
        self,
        responder: F,
        configure: impl FnOnce(ResponderConfig) -> ResponderConfig,
        cancel: CancellationToken,
    ) -> Result<SubscriptionHandle, RpcError>
    where
        Req: DeserializeOwned + TypeNamed + Send + 'static,
        Resp: Serialize + TypeNamed + Send + 'static,
        F: Fn(Req, Headers, CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, anyhow::Error>> + Send + 'static,
    {
        // Validation: enforce the 255-byte cap before any broker call.
        validate_response_type::<Resp>(&*self.type_names)?;

        let request_type = Req::type_name();
        let response_type = Resp::type_name();

        // Setup step 1: seed defaults from bus config and the queue-type convention.
        let durable = matches!(
            self.naming.queue_type(request_type.as_str()),
            QueueTypeHint::Durable
        );
        let responder_cfg = configure(ResponderConfig::from_defaults(&self.config, durable));

        // Setup step 2: resolve the effective routing key.
        let routing_key = responder_cfg
            .queue_name
            .clone()
            .unwrap_or_else(|| self.naming.rpc_routing_key(request_type.as_str()));

        // Setup step 3: declare the request exchange.
        let request_exchange = self.naming.rpc_request_exchange(request_type.as_str());
        self.broker.declare_exchange(&request_exchange, true).await?;

        // Setup step 4: declare the request queue.
        let queue_name = responder_cfg
            .queue_name
            .clone()
            .unwrap_or_else(|| routing_key.clone());
        let declared = self
            .broker
            .declare_queue(QueueSpec {
                name: Some(&queue_name),
                durable: responder_cfg.durable,
                exclusive: false,
                auto_delete: false,
                expires: None,
                arguments: responder_cfg.arguments.clone(),
            })
            .await?;

        // Setup step 5: bind.
        self.broker
            .bind(&declared.name, &request_exchange, &routing_key)
            .await?;

        // Setup step 6: start the consumer.
        let mut consumer = self
            .broker
            .consume(&declared.name, responder_cfg.prefetch_count)
            .await?;

        let stop = CancellationToken::new();
        let consumer_stop = stop.clone();
        let broker = self.broker.clone();
        let naming = self.naming.clone();
        let queue_name_for_task = declared.name.clone();

        tokio::spawn(async move {
            info!(queue = %queue_name_for_task, "responder consumer started");
            loop {
                tokio::select! {
                    () = consumer_stop.cancelled() => break,
                    delivery = consumer.next() => {
                        let Some(delivery) = delivery else { break };
                        let broker = broker.clone();
                        let naming = naming.clone();
                        let responder = responder.clone();
                        let delivery_cancel = consumer_stop.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_message::<Req, Resp, F, Fut>(
                                &broker,
                                &*naming,
                                &responder,
                                delivery,
                                delivery_cancel,
                            )
                            .await
                            {
                                error!("responder delivery failed: {err}");
                            }
                        });
                    }
                }
            }
            consumer.close();
            info!(queue = %queue_name_for_task, "responder consumer stopped");
        });

        Ok(SubscriptionHandle { stop })
    }
}

/// Handle one inbound request delivery: invoke the responder, publish its reply or fault,
/// ack on success and nack on failure so the consumer layer applies redelivery policy.
async fn handle_message<Req, Resp, F, Fut>(
    broker: &impl Broker,
    naming: &dyn NamingConvention,
    responder: &F,
    delivery: BrokerDelivery,
    delivery_cancel: CancellationToken,
) -> Result<(), anyhow::Error>
where
    Req: DeserializeOwned + TypeNamed,
    Resp: Serialize + TypeNamed,
    F: Fn(Req, Headers, CancellationToken) -> Fut,
    Fut: Future<Output = Result<Resp, anyhow::Error>> + Send,
{
    let correlation_id = delivery.correlation_id.clone();
    let reply_to = delivery.reply_to.clone();
    let headers = delivery.headers.clone();
    let body = delivery.body.clone();

    // Step 1: resolve the reply exchange; the broker default needs no declare.
    let response_type = Resp::type_name();
    let reply_exchange = naming.rpc_response_exchange(response_type.as_str());
    if reply_exchange != DEFAULT_EXCHANGE {
        broker.declare_exchange(&reply_exchange, false).await?;
    }

    let decoded: Result<Req, anyhow::Error> =
        serde_json::from_slice(&body).map_err(anyhow::Error::from);

    let outcome = match decoded {
        Ok(request) => {
            // Step 2: invoke the responder.
            responder(request, headers, delivery_cancel.clone()).await
        }
        Err(err) => Err(err),
    };

    let Some(reply_to) = reply_to else {
        // No reply-to: nothing to publish regardless of outcome.
        match outcome {
            Ok(_) => {
                delivery.ack();
                return Ok(());
            }
            Err(err) => {
                delivery.nack();
                return Err(err);
            }
        }
    };

    match outcome {
        Ok(response) => {
            // Step 2 continued: publish the reply.
            let body = serde_json::to_vec(&response)?;
            broker
                .publish(
                    &reply_exchange,
                    &reply_to,
                    PublishSpec {
                        reply_to: None,
                        correlation_id: correlation_id.clone(),
                        priority: 0,
                        headers: Headers::new(),
                        delivery_mode: DeliveryMode::NonPersistent,
                        expiration: None,
                        mandatory: false,
                        body,
                    },
                )
                .await?;
            delivery.ack();
            Ok(())
        }
        Err(err) => {
            // Step 3: a responder cancellation while the delivery itself is being torn down
            // publishes nothing and simply re-raises.
            if err.downcast_ref::<ResponderCancelled>().is_some() && delivery_cancel.is_cancelled()
            {
                delivery.nack();
                return Err(err);
            }

            // Step 4: any other error gets a fault reply, then is re-raised.
            warn!("responder failed, publishing fault reply: {err}");
            let mut fault_headers = Headers::new();
            fault_headers.insert(HEADER_IS_FAULTED.to_string(), HeaderValue::Bool(true));
            fault_headers.insert(
                HEADER_EXCEPTION_MESSAGE.to_string(),
                HeaderValue::Bytes(err.to_string().into_bytes()),
            );
            broker
                .publish(
                    &reply_exchange,
                    &reply_to,
                    PublishSpec {
                        reply_to: None,
                        correlation_id,
                        priority: 0,
                        headers: fault_headers,
                        delivery_mode: DeliveryMode::NonPersistent,
                        expiration: None,
                        mandatory: false,
                        // Default (empty) payload: the reply's value carries no meaningful
                        // body once faulted.
                        body: Vec::new(),
                    },
                )
                .await?;
            delivery.nack();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::convention::{TypeName, Utf8TypeNameSerializer};
    use super::*;

    #[test]
    fn accepts_a_name_within_the_byte_cap() {
        let name = TypeName::new("short");
        assert!(validate_type_name_bytes(&Utf8TypeNameSerializer, &name).is_ok());
    }

    #[test]
    fn rejects_a_name_over_the_byte_cap() {
        let name = TypeName::new("x".repeat(MAX_RESPONSE_TYPE_NAME_BYTES + 1));
        let err = validate_type_name_bytes(&Utf8TypeNameSerializer, &name)
            .expect_err("should reject an oversized name");
        assert!(matches!(err, RpcError::ArgumentOutOfRange));
    }
}
