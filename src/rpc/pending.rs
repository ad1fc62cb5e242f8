//! The Pending-Request Table: a concurrent, type-erased map from correlation id
//! to a pair of callbacks, admitting an atomic take-if-present.

use std::sync::Arc;

use dashmap::DashMap;

use super::broker::BrokerDelivery;
use super::types::CorrelationId;

/// The two callbacks a [`PendingTable`] entry resolves to. Type-erased: the table itself
/// never knows the expected response type, only the closures captured by the issuer at
/// registration time do.
pub struct ResponseAction {
    on_success: Box<dyn FnOnce(BrokerDelivery) + Send>,
    on_failure: Box<dyn FnOnce() + Send>,
}

impl ResponseAction {
    /// Build a new action from its success and failure callbacks.
    pub fn new(
        on_success: impl FnOnce(BrokerDelivery) + Send + 'static,
        on_failure: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        }
    }

    /// Dispatch the success path. Consumes `self` since a `ResponseAction` fires at most once.
    pub fn succeed(self, delivery: BrokerDelivery) {
        (self.on_success)(delivery);
    }

    /// Dispatch the failure path. Consumes `self` since a `ResponseAction` fires at most once.
    pub fn fail(self) {
        (self.on_failure)();
    }
}

/// Concurrent map from correlation id to [`ResponseAction`].
///
/// Backed by [`DashMap`] rather than a single `Mutex<HashMap<..>>`: `try_remove` needs to
/// atomically detach an entry before its callback runs, and a sharded concurrent map gives
/// that without the whole table serializing on one lock for every in-flight request.
#[derive(Clone)]
pub struct PendingTable(Arc<DashMap<CorrelationId, ResponseAction>>);

impl PendingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(DashMap::new()))
    }

    /// Register a new pending entry. Replaces any prior entry under the same id, which
    /// should never happen given the correlation-id generator's uniqueness guarantee.
    pub fn insert(&self, id: CorrelationId, action: ResponseAction) {
        self.0.insert(id, action);
    }

    /// Atomically remove and return the entry for `id`, if present. The only path that may
    /// dispatch a reply to a caller.
    #[must_use]
    pub fn try_remove(&self, id: &str) -> Option<ResponseAction> {
        self.0.remove(id).map(|(_, action)| action)
    }

    /// Remove an entry without dispatching it, e.g. after cancellation or timeout.
    pub fn remove(&self, id: &str) {
        self.0.remove(id);
    }

    /// Drain the whole table and return its values, so the recovery listener can invoke
    /// failure callbacks outside any lock.
    #[must_use]
    pub fn snapshot_and_clear(&self) -> Vec<ResponseAction> {
        let keys: Vec<CorrelationId> = self.0.iter().map(|entry| entry.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.0.remove(&key).map(|(_, action)| action))
            .collect()
    }

    /// Number of entries currently pending. Exposed for tests asserting the table is empty.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::rpc::types::Headers;

    fn test_delivery() -> BrokerDelivery {
        let (delivery, _ack_rx) = BrokerDelivery::new(Vec::new(), None, None, Headers::new());
        delivery
    }

    #[test]
    fn try_remove_returns_the_action_exactly_once() {
        let table = PendingTable::new();
        table.insert("abc".to_string(), ResponseAction::new(|_| {}, || {}));

        assert!(table.try_remove("abc").is_some());
        assert!(table.try_remove("abc").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn snapshot_and_clear_drains_every_entry() {
        let table = PendingTable::new();
        for id in ["a", "b", "c"] {
            table.insert(id.to_string(), ResponseAction::new(|_| {}, || {}));
        }

        let drained = table.snapshot_and_clear();
        assert_eq!(drained.len(), 3);
        assert!(table.is_empty());
    }

    #[test]
    fn succeed_invokes_on_success_not_on_failure() {
        let success_called = Arc::new(AtomicBool::new(false));
        let failure_called = Arc::new(AtomicBool::new(false));
        let s = success_called.clone();
        let f = failure_called.clone();
        let action = ResponseAction::new(
            move |_delivery| s.store(true, Ordering::SeqCst),
            move || f.store(true, Ordering::SeqCst),
        );

        action.succeed(test_delivery());

        assert!(success_called.load(Ordering::SeqCst));
        assert!(!failure_called.load(Ordering::SeqCst));
    }
}
