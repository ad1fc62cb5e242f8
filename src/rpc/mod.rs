//! Request/response correlation over a topic- and direct-exchange capable broker.
//!
//! An [`engine::RpcEngine`] dispatches correlated requests (`request`), hosts responders
//! (`respond`), and tears itself down (`shutdown`). It is generic over a [`broker::Broker`]
//! adapter: [`lapin_broker::LapinBroker`] for a live connection, [`mock_broker::MockBroker`]
//! for tests. [`blocking::BlockingRpcClient`] wraps the engine for non-async callers.

pub mod blocking;
pub mod broker;
pub mod config;
pub mod convention;
pub mod correlation;
pub mod delivery_mode;
pub mod engine;
pub mod error;
pub mod lapin_broker;
pub mod mock_broker;
pub mod pending;
pub mod recovery;
pub mod registry;
pub mod responder;
pub mod types;

pub use broker::Broker;
pub use config::{Config, RequestConfig, ResponderConfig};
pub use convention::{
    ConventionalNaming, NamingConvention, TypeName, TypeNameSerializer, TypeNamed,
    Utf8TypeNameSerializer,
};
pub use correlation::{CorrelationIdGenerator, UuidCorrelationIdGenerator};
pub use delivery_mode::{AlwaysNonPersistent, AlwaysPersistent, DeliveryModeStrategy};
pub use engine::RpcEngine;
pub use error::{BrokerError, EngineError, RpcError};
pub use responder::SubscriptionHandle;
pub use types::{DeliveryMode, Headers, RecoveryEvent, RecoveryEventKind};
