//! The RPC engine: ties the Request Dispatcher, Response Subscription Registry,
//! Pending-Request Table and Recovery Listener together behind one process-wide handle.
//! The Responder Host lives in [`super::responder`].

use std::sync::{Arc, Mutex as StdMutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::broker::{Broker, BrokerDelivery, PublishSpec};
use super::config::{Config, RequestConfig};
use super::convention::{NamingConvention, TypeNameSerializer, TypeNamed};
use super::correlation::CorrelationIdGenerator;
use super::delivery_mode::DeliveryModeStrategy;
use super::error::RpcError;
use super::pending::{PendingTable, ResponseAction};
use super::recovery::RecoveryListener;
use super::registry::{RpcKey, SubscriptionRegistry};
use super::responder::{Responder, SubscriptionHandle};
use super::types::{HeaderValue, Headers, DEFAULT_EXCEPTION_MESSAGE, HEADER_EXCEPTION_MESSAGE, HEADER_IS_FAULTED};

/// What arrived for an outstanding request: either a reply, or a signal that the connection
/// was recovered while the request was in flight.
enum ResponseOutcome {
    /// A reply was delivered and matched to this correlation id.
    Delivered(BrokerDelivery),
    /// The consumer channel was recovered; the reply (if any) can no longer be tracked.
    Lost,
}

/// Removes a correlation id from the pending table on every exit path, including early
/// drops caused by the outer timeout.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Process-wide RPC engine, generic over the broker adapter so tests can run it against an
/// in-memory [`super::mock_broker::MockBroker`].
pub struct RpcEngine<B: Broker> {
    broker: B,
    config: Config,
    naming: Arc<dyn NamingConvention>,
    correlation_ids: Arc<dyn CorrelationIdGenerator>,
    delivery_mode: Arc<dyn DeliveryModeStrategy>,
    type_names: Arc<dyn TypeNameSerializer>,
    pending: PendingTable,
    registry: Arc<SubscriptionRegistry<B>>,
    recovery: RecoveryListener,
}

impl<B: Broker> RpcEngine<B> {
    /// Construct a new engine over `broker`, spawning its recovery listener immediately.
    pub fn new(
        broker: B,
        config: Config,
        naming: Arc<dyn NamingConvention>,
        correlation_ids: Arc<dyn CorrelationIdGenerator>,
        delivery_mode: Arc<dyn DeliveryModeStrategy>,
        type_names: Arc<dyn TypeNameSerializer>,
    ) -> Self {
        let pending = PendingTable::new();
        let registry = Arc::new(SubscriptionRegistry::new(broker.clone(), pending.clone()));
        let recovery = RecoveryListener::spawn(&broker, pending.clone(), registry.clone());
        Self {
            broker,
            config,
            naming,
            correlation_ids,
            delivery_mode,
            type_names,
            pending,
            registry,
            recovery,
        }
    }

    /// Issue a request and await its response.
    #[instrument(skip_all, fields(request_type = %Req::type_name(), response_type = %Resp::type_name()))]
    pub async fn request<Req, Resp>(
        &self,
        req: Req,
        configure: impl FnOnce(RequestConfig) -> RequestConfig,
        cancel: CancellationToken,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + TypeNamed,
        Resp: DeserializeOwned + TypeNamed,
    {
        // Step 1: seed defaults, apply the caller's overrides.
        let req_cfg = configure(RequestConfig::from_defaults(&self.config));
        let expiration = req_cfg.expiration;

        // Step 2: the composed cancellation scopes everything below; a finite expiration
        // races the whole body, an infinite one leaves only the outer token in play.
        let body = self.request_body::<Req, Resp>(req, req_cfg, cancel.clone());
        match expiration {
            Some(timeout) => match tokio::time::timeout(timeout, body).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Cancelled),
            },
            None => body.await,
        }
    }

    async fn request_body<Req, Resp>(
        &self,
        req: Req,
        req_cfg: RequestConfig,
        cancel: CancellationToken,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + TypeNamed,
        Resp: DeserializeOwned + TypeNamed,
    {
        let request_type = Req::type_name();
        let response_type = Resp::type_name();

        // Step 3: a fresh correlation id.
        let correlation_id = self.correlation_ids.generate();

        // Step 4: register the pending request; removed on every exit path via `_guard`.
        let (tx, rx) = oneshot::channel::<ResponseOutcome>();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let tx_success = tx.clone();
        let tx_failure = tx;
        let action = ResponseAction::new(
            move |delivery| {
                if let Some(tx) = tx_success.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(ResponseOutcome::Delivered(delivery));
                }
            },
            move || {
                if let Some(tx) = tx_failure.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(ResponseOutcome::Lost);
                }
            },
        );
        self.pending.insert(correlation_id.clone(), action);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: correlation_id.clone(),
        };

        // Step 5: ensure a reply subscription exists; its queue name is our reply-to.
        let key = RpcKey {
            request_type: request_type.as_str().to_string(),
            response_type: response_type.as_str().to_string(),
        };
        let reply_to = self
            .registry
            .ensure_reply_queue(key, &*self.naming, self.config.prefetch_count, cancel.clone())
            .await?;

        // Step 6: declare the request exchange and publish.
        let exchange = self.naming.rpc_request_exchange(request_type.as_str());
        let routing_key = req_cfg
            .routing_key
            .clone()
            .unwrap_or_else(|| self.naming.rpc_routing_key(request_type.as_str()));
        self.broker.declare_exchange(&exchange, true).await?;

        let body = serde_json::to_vec(&req).map_err(|err| RpcError::Encode(err.into()))?;
        self.broker
            .publish(
                &exchange,
                &routing_key,
                PublishSpec {
                    reply_to: Some(reply_to),
                    correlation_id: Some(correlation_id.clone()),
                    priority: req_cfg.priority,
                    headers: req_cfg.headers,
                    delivery_mode: self.delivery_mode.delivery_mode(request_type.as_str()),
                    expiration: req_cfg.expiration,
                    mandatory: req_cfg.mandatory,
                    body,
                },
            )
            .await?;

        // Step 7: await completion, racing the outer cancellation directly (the expiration
        // race is handled by the `tokio::time::timeout` wrapper in `request`).
        let outcome = tokio::select! {
            result = rx => result.map_err(|_| RpcError::ConnectionLost)?,
            () = cancel.cancelled() => return Err(RpcError::Cancelled),
        };

        let delivery = match outcome {
            ResponseOutcome::Delivered(delivery) => delivery,
            ResponseOutcome::Lost => return Err(RpcError::ConnectionLost),
        };

        // Step 8: translate a faulted reply into a `ResponderFault`, otherwise decode.
        if delivery
            .headers
            .get(HEADER_IS_FAULTED)
            .and_then(HeaderValue::as_bool)
            .unwrap_or(false)
        {
            let message = delivery
                .headers
                .get(HEADER_EXCEPTION_MESSAGE)
                .and_then(HeaderValue::as_bytes)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_EXCEPTION_MESSAGE.to_string());
            delivery.ack();
            return Err(RpcError::ResponderFault(message));
        }

        let decoded = serde_json::from_slice::<Resp>(&delivery.body);
        delivery.ack();
        decoded.map_err(|err| RpcError::Decode(err.into()))
    }

    /// Host a responder for a request type.
    pub async fn respond<Req, Resp, F, Fut>(
        &self,
        responder: F,
        configure: impl FnOnce(super::config::ResponderConfig) -> super::config::ResponderConfig,
        cancel: CancellationToken,
    ) -> Result<SubscriptionHandle, RpcError>
    where
        Req: DeserializeOwned + TypeNamed + Send + 'static,
        Resp: Serialize + TypeNamed + Send + 'static,
        F: Fn(Req, Headers, CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Resp, anyhow::Error>> + Send + 'static,
    {
        Responder::new(
            self.broker.clone(),
            self.config.clone(),
            self.naming.clone(),
            self.type_names.clone(),
        )
        .host::<Req, Resp, F, Fut>(responder, configure, cancel)
        .await
    }

    /// Number of requests currently awaiting a reply. Exposed for tests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of cached reply subscriptions. Exposed for tests.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Release the recovery listener and close every cached subscription. The listener is
    /// dropped first so a concurrent recovery callback cannot race this teardown.
    pub async fn shutdown(self) {
        drop(self.recovery);
        self.registry.invalidate_all().await;
        debug!("RPC engine shut down");
    }
}
