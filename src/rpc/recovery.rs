//! The Recovery Listener: on consumer-channel recovery, invalidate every
//! pending request and tear down every cached subscription.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::broker::Broker;
use super::pending::PendingTable;
use super::registry::SubscriptionRegistry;
use super::types::RecoveryEventKind;

/// Subscribes to the broker adapter's connection-recovered events for the lifetime of the
/// engine. Dropping it cancels the background task, releasing the event subscription before
/// the engine closes any remaining subscription handles.
pub struct RecoveryListener {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RecoveryListener {
    /// Spawn the listener task.
    pub fn spawn<B: Broker>(
        broker: &B,
        pending: PendingTable,
        registry: Arc<SubscriptionRegistry<B>>,
    ) -> Self {
        let stop = CancellationToken::new();
        let task_stop = stop.clone();
        let mut events = broker.on_recovery();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task_stop.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) if event.kind == RecoveryEventKind::Consumer => {
                            info!("consumer channel recovered, invalidating pending requests and subscriptions");
                            for action in pending.snapshot_and_clear() {
                                action.fail();
                            }
                            registry.invalidate_all().await;
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "recovery event receiver lagged, some events were dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for RecoveryListener {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
