//! Naming conventions and type naming.

use uuid::Uuid;

/// Bounded-length identifier for a payload type, produced by a [`TypeNameSerializer`].
/// The broker's header values are length-limited; [`crate::rpc::responder::validate_response_type`]
/// enforces the 255-byte cap this type exists to make explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName(String);

impl TypeName {
    /// Wrap a string as a `TypeName` without validating its length.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The number of bytes this name would occupy on the wire.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.0.len()
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gives a Rust type the name the naming convention and type-name serializer key off.
///
/// A blanket implementation derives the name from [`std::any::type_name`], so every distinct
/// Rust type is already distinguishable without any manual impl; two request types that
/// should be treated as the same RPC identity need only share a newtype.
pub trait TypeNamed {
    /// The name this type is identified by in exchange/queue/routing-key conventions.
    fn type_name() -> TypeName;
}

impl<T> TypeNamed for T {
    fn type_name() -> TypeName {
        TypeName::new(std::any::type_name::<T>())
    }
}

/// Durability hint a [`NamingConvention`] gives for a request type's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTypeHint {
    /// The request queue should survive a broker restart.
    Durable,
    /// The request queue need not survive a broker restart.
    Transient,
}

/// Pure mapping from payload types to broker names.
pub trait NamingConvention: Send + Sync + 'static {
    /// Exchange a request of this type is published to.
    fn rpc_request_exchange(&self, request_type: &str) -> String;
    /// Routing key a request of this type is published with, absent an override.
    fn rpc_routing_key(&self, request_type: &str) -> String;
    /// Exchange a reply carrying this response type is published to.
    fn rpc_response_exchange(&self, response_type: &str) -> String;
    /// Reply queue name for a given response type, absent a server-assigned name.
    fn rpc_return_queue(&self, response_type: &str) -> String;
    /// Durability hint for a request type's queue.
    fn queue_type(&self, request_type: &str) -> QueueTypeHint;
}

/// Default [`NamingConvention`]: request/response exchanges are derived from the type name,
/// and reply queues carry a process-unique suffix so that two processes hosting the same
/// response type each get their own reply queue.
///
/// Never returns [`crate::rpc::types::DEFAULT_EXCHANGE`] from `rpc_response_exchange`: the
/// reply exchange is always declarable, so the Response Subscription Registry always binds.
pub struct ConventionalNaming {
    /// Suffix distinguishing this process's reply queues from another process's.
    instance_id: Uuid,
}

impl ConventionalNaming {
    /// Create a new convention with a fresh process-unique instance id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
        }
    }
}

impl Default for ConventionalNaming {
    fn default() -> Self {
        Self::new()
    }
}

impl NamingConvention for ConventionalNaming {
    fn rpc_request_exchange(&self, request_type: &str) -> String {
        format!("rpc:{request_type}")
    }

    fn rpc_routing_key(&self, request_type: &str) -> String {
        request_type.to_string()
    }

    fn rpc_response_exchange(&self, response_type: &str) -> String {
        format!("rpc:response:{response_type}")
    }

    fn rpc_return_queue(&self, response_type: &str) -> String {
        format!("rpc.response.{response_type}.{}", self.instance_id)
    }

    fn queue_type(&self, _request_type: &str) -> QueueTypeHint {
        QueueTypeHint::Durable
    }
}

/// Maps a response type to a bounded-length wire identifier.
pub trait TypeNameSerializer: Send + Sync + 'static {
    /// Serialize a type name to bytes for length validation.
    fn serialize(&self, type_name: &TypeName) -> Vec<u8>;
}

/// Serializes a type name as its raw UTF-8 bytes, untruncated, so the responder host's own
/// length check against the broker's header-length limit sees the real serialized size.
pub struct Utf8TypeNameSerializer;

impl TypeNameSerializer for Utf8TypeNameSerializer {
    fn serialize(&self, type_name: &TypeName) -> Vec<u8> {
        type_name.as_str().as_bytes().to_vec()
    }
}
