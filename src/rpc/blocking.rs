//! Blocking facade over [`RpcEngine`] for callers that are not themselves `async`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::broker::Broker;
use super::config::{RequestConfig, ResponderConfig};
use super::convention::TypeNamed;
use super::engine::RpcEngine;
use super::error::RpcError;
use super::responder::SubscriptionHandle;
use super::types::Headers;

/// Wraps an [`RpcEngine`] and a `tokio` runtime handle so `request`/`respond` can be called
/// from synchronous code. Every call still runs the same async machinery; this only moves
/// the awaiting onto the calling thread.
#[derive(Clone)]
pub struct BlockingRpcClient<B: Broker> {
    engine: Arc<RpcEngine<B>>,
    handle: Handle,
}

impl<B: Broker> BlockingRpcClient<B> {
    /// Wrap an engine with the runtime handle its async work should run on.
    #[must_use]
    pub fn new(engine: Arc<RpcEngine<B>>, handle: Handle) -> Self {
        Self { engine, handle }
    }

    /// Blocking counterpart to [`RpcEngine::request`].
    ///
    /// # Panics
    ///
    /// Panics if called from within the wrapped runtime's own worker thread; `block_on`
    /// cannot nest inside the runtime it blocks on.
    pub fn request<Req, Resp>(
        &self,
        req: Req,
        configure: impl FnOnce(RequestConfig) -> RequestConfig,
        cancel: CancellationToken,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + TypeNamed,
        Resp: DeserializeOwned + TypeNamed,
    {
        self.handle
            .block_on(self.engine.request::<Req, Resp>(req, configure, cancel))
    }

    /// Blocking counterpart to [`RpcEngine::respond`].
    ///
    /// # Panics
    ///
    /// See [`Self::request`].
    pub fn respond<Req, Resp, F, Fut>(
        &self,
        responder: F,
        configure: impl FnOnce(ResponderConfig) -> ResponderConfig,
        cancel: CancellationToken,
    ) -> Result<SubscriptionHandle, RpcError>
    where
        Req: DeserializeOwned + TypeNamed + Send + 'static,
        Resp: Serialize + TypeNamed + Send + 'static,
        F: Fn(Req, Headers, CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Resp, anyhow::Error>> + Send + 'static,
    {
        self.handle
            .block_on(self.engine.respond::<Req, Resp, F, Fut>(responder, configure, cancel))
    }

    /// Number of requests currently awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.engine.pending_count()
    }

    /// Number of cached reply subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.engine.subscription_count()
    }
}
