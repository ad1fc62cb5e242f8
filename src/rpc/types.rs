//! Wire-level value types shared by the RPC engine and the [`crate::rpc::broker::Broker`] trait.

use std::collections::HashMap;

/// Header key a fault reply carries to signal the responder threw.
pub const HEADER_IS_FAULTED: &str = "IsFaulted";
/// Header key a fault reply carries with the UTF-8 encoded exception message.
pub const HEADER_EXCEPTION_MESSAGE: &str = "ExceptionMessage";
/// Default string used when a fault reply's exception message header is absent or empty.
pub const DEFAULT_EXCEPTION_MESSAGE: &str = "The exception message has not been specified.";
/// Name of the broker's default (nameless) exchange; every queue is implicitly bound to it
/// under its own name.
pub const DEFAULT_EXCHANGE: &str = "";

/// A single header value. `AMQP` field tables can carry richer types; the engine only ever
/// needs these three.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// A boolean flag, used for `IsFaulted`.
    Bool(bool),
    /// Raw bytes, used for `ExceptionMessage`.
    Bytes(Vec<u8>),
    /// A UTF-8 string.
    String(String),
}

impl HeaderValue {
    /// View this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// View this value as a byte slice, if it holds bytes or a string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::String(s) => Some(s.as_bytes()),
            Self::Bool(_) => None,
        }
    }
}

/// A message's header map. Order is not significant.
pub type Headers = HashMap<String, HeaderValue>;

/// Delivery mode a request is published with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Broker should persist the message to disk.
    Persistent,
    /// Broker may drop the message on restart.
    NonPersistent,
}

/// Distinguishes which of the broker adapter's channels was re-established after a
/// disconnect. Only `Consumer` recovery invalidates pending requests and subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryEventKind {
    /// The channel the engine consumes replies and request deliveries on was recovered.
    Consumer,
    /// The channel the engine publishes on was recovered.
    Producer,
}

/// A connection-recovered event emitted by the broker adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryEvent {
    /// Which channel kind was recovered.
    pub kind: RecoveryEventKind,
}

/// Correlation id carried on requests and echoed back on replies.
pub type CorrelationId = String;
