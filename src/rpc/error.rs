//! Error taxonomy for the RPC engine.

/// Errors a [`crate::rpc::engine::RpcEngine::request`] call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The outer cancellation token fired, or the request's expiration elapsed first.
    /// Both surface identically; callers that care which can inspect their own token.
    #[error("request cancelled or timed out")]
    Cancelled,
    /// The consumer channel was recovered while this request was in flight; the reply, if
    /// any ever arrives, can no longer be tracked.
    #[error("connection was recovered while the request was in flight")]
    ConnectionLost,
    /// The round trip succeeded but the reply carried `IsFaulted = true`.
    #[error("responder fault: {0}")]
    ResponderFault(String),
    /// A response type's serialized name exceeds the broker's 255-byte header length limit.
    #[error("response type name exceeds 255 bytes")]
    ArgumentOutOfRange,
    /// Deserializing the reply body as the expected response type failed.
    #[error("failed to decode response payload: {0}")]
    Decode(#[source] anyhow::Error),
    /// Serializing the request payload failed.
    #[error("failed to encode request payload: {0}")]
    Encode(#[source] anyhow::Error),
    /// The broker adapter reported an error.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Errors the [`crate::rpc::broker::Broker`] adapter can report.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Declaring an exchange failed.
    #[error("declaring exchange failed: {0}")]
    DeclareExchange(#[source] anyhow::Error),
    /// Declaring a queue failed.
    #[error("declaring queue failed: {0}")]
    DeclareQueue(#[source] anyhow::Error),
    /// Binding a queue to an exchange failed.
    #[error("binding queue failed: {0}")]
    Bind(#[source] anyhow::Error),
    /// Publishing a message failed.
    #[error("publishing message failed: {0}")]
    Publish(#[source] anyhow::Error),
    /// Starting a consumer failed.
    #[error("starting consumer failed: {0}")]
    Consume(#[source] anyhow::Error),
}

/// Errors that can occur while constructing or tearing down an [`crate::rpc::engine::RpcEngine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Connecting the broker adapter failed.
    #[error("connecting broker adapter failed: {0}")]
    Connect(#[source] anyhow::Error),
    /// Spawning the recovery listener failed.
    #[error("spawning recovery listener failed: {0}")]
    Recovery(#[source] anyhow::Error),
}
