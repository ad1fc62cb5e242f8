//! Bus-wide defaults and per-call configuration.

use std::time::Duration;

use super::types::Headers;

/// Bus-wide defaults the engine falls back to when a call's `configure` callback doesn't
/// override them.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default request expiration, used when a [`RequestConfig`] doesn't set one.
    pub default_timeout: Duration,
    /// Default consumer prefetch count, used when a [`ResponderConfig`] doesn't set one.
    pub prefetch_count: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            prefetch_count: 50,
        }
    }
}

/// Per-request overrides.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Routing key to publish the request with. Defaults to the naming convention's routing
    /// key for the request type.
    pub routing_key: Option<String>,
    /// Request expiration. `None` means infinite (no `expiration` property is set).
    /// Defaults to the bus-wide timeout.
    pub expiration: Option<Duration>,
    /// Message priority, 0-255.
    pub priority: u8,
    /// Additional headers to publish alongside the request.
    pub headers: Headers,
    /// Whether the publish should be mandatory (broker returns it if unroutable).
    pub mandatory: bool,
    /// Whether to wait for a publisher confirm.
    pub publisher_confirms: bool,
}

impl RequestConfig {
    /// Seed a request configuration from the bus-wide defaults.
    #[must_use]
    pub fn from_defaults(config: &Config) -> Self {
        Self {
            routing_key: None,
            expiration: Some(config.default_timeout),
            priority: 0,
            headers: Headers::new(),
            mandatory: false,
            publisher_confirms: false,
        }
    }
}

/// Per-responder overrides.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Queue name to declare. Defaults to the routing-key convention for the request type.
    pub queue_name: Option<String>,
    /// Whether the request queue should be durable. Defaults to the queue-type convention.
    pub durable: bool,
    /// Consumer prefetch count. Defaults to the bus-wide prefetch.
    pub prefetch_count: u16,
    /// Additional queue declare arguments.
    pub arguments: Headers,
}

impl ResponderConfig {
    /// Seed a responder configuration from the bus-wide defaults and the request type's
    /// queue-type convention.
    #[must_use]
    pub fn from_defaults(config: &Config, durable: bool) -> Self {
        Self {
            queue_name: None,
            durable,
            prefetch_count: config.prefetch_count,
            arguments: Headers::new(),
        }
    }
}
