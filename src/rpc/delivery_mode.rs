//! Delivery-mode strategy.

use super::types::DeliveryMode;

/// Maps a request type to persistent or non-persistent delivery.
pub trait DeliveryModeStrategy: Send + Sync + 'static {
    /// Decide the delivery mode for a request of this type.
    fn delivery_mode(&self, request_type: &str) -> DeliveryMode;
}

/// Always publishes requests as non-persistent. Replies are always non-persistent
/// regardless of this strategy.
pub struct AlwaysNonPersistent;

impl DeliveryModeStrategy for AlwaysNonPersistent {
    fn delivery_mode(&self, _request_type: &str) -> DeliveryMode {
        DeliveryMode::NonPersistent
    }
}

/// Always publishes requests as persistent.
pub struct AlwaysPersistent;

impl DeliveryModeStrategy for AlwaysPersistent {
    fn delivery_mode(&self, _request_type: &str) -> DeliveryMode {
        DeliveryMode::Persistent
    }
}
