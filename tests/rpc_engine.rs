//! Integration tests for the RPC engine against [`MockBroker`], covering the request/reply
//! round trip, fault propagation, timeout, concurrent correlation, and recovery invalidation.

use std::sync::Arc;
use std::time::Duration;

use rabbit_rpc::rpc::broker::{Broker, PublishSpec};
use rabbit_rpc::rpc::config::{Config, RequestConfig, ResponderConfig};
use rabbit_rpc::rpc::convention::{ConventionalNaming, TypeName, TypeNameSerializer, Utf8TypeNameSerializer};
use rabbit_rpc::rpc::correlation::UuidCorrelationIdGenerator;
use rabbit_rpc::rpc::delivery_mode::AlwaysNonPersistent;
use rabbit_rpc::rpc::engine::RpcEngine;
use rabbit_rpc::rpc::error::RpcError;
use rabbit_rpc::rpc::mock_broker::MockBroker;
use rabbit_rpc::rpc::pending::PendingTable;
use rabbit_rpc::rpc::registry::{RpcKey, SubscriptionRegistry};
use rabbit_rpc::rpc::types::{
    DeliveryMode, HeaderValue, Headers, RecoveryEvent, RecoveryEventKind, HEADER_EXCEPTION_MESSAGE,
    HEADER_IS_FAULTED,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Ping {
    message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Pong {
    message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct NeverRequested;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct NeverReplied;

fn new_engine() -> RpcEngine<MockBroker> {
    RpcEngine::new(
        MockBroker::new(),
        Config::default(),
        Arc::new(ConventionalNaming::new()),
        Arc::new(UuidCorrelationIdGenerator),
        Arc::new(AlwaysNonPersistent),
        Arc::new(Utf8TypeNameSerializer),
    )
}

#[tokio::test]
async fn echo_round_trip() {
    let engine = Arc::new(new_engine());
    let responder_engine = engine.clone();
    let _handle = responder_engine
        .respond::<Ping, Pong, _, _>(
            |req: Ping, _headers, _cancel| async move {
                Ok(Pong {
                    message: req.message,
                })
            },
            |cfg: ResponderConfig| cfg,
            CancellationToken::new(),
        )
        .await
        .expect("hosting responder failed");

    // Give the responder's consumer loop a moment to attach before publishing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let reply = engine
        .request::<Ping, Pong>(
            Ping {
                message: "hello".to_string(),
            },
            |cfg: RequestConfig| cfg,
            CancellationToken::new(),
        )
        .await
        .expect("request failed");

    assert_eq!(reply.message, "hello");
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn responder_fault_surfaces_as_responder_fault() {
    let broker = MockBroker::new();
    let engine = Arc::new(RpcEngine::new(
        broker.clone(),
        Config::default(),
        Arc::new(ConventionalNaming::new()),
        Arc::new(UuidCorrelationIdGenerator),
        Arc::new(AlwaysNonPersistent),
        Arc::new(Utf8TypeNameSerializer),
    ));
    let responder_engine = engine.clone();
    let _handle = responder_engine
        .respond::<Ping, Pong, _, _>(
            |_req: Ping, _headers, _cancel| async move {
                Err(anyhow::anyhow!("boom"))
            },
            |cfg: ResponderConfig| cfg,
            CancellationToken::new(),
        )
        .await
        .expect("hosting responder failed");

    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = engine
        .request::<Ping, Pong>(
            Ping {
                message: "hello".to_string(),
            },
            |cfg: RequestConfig| cfg,
            CancellationToken::new(),
        )
        .await
        .expect_err("request should surface the responder's fault");

    match err {
        RpcError::ResponderFault(message) => assert_eq!(message, "boom"),
        other => panic!("expected ResponderFault, got {other:?}"),
    }

    // Exactly one fault reply was published, carrying the well-known fault headers.
    let published = broker.published().await;
    let fault_replies: Vec<_> = published
        .iter()
        .filter(|msg| {
            msg.spec
                .headers
                .get(HEADER_IS_FAULTED)
                .and_then(HeaderValue::as_bool)
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(fault_replies.len(), 1);
    let exception_message = fault_replies[0]
        .spec
        .headers
        .get(HEADER_EXCEPTION_MESSAGE)
        .and_then(HeaderValue::as_bytes)
        .expect("fault reply should carry an exception message");
    assert_eq!(exception_message, b"boom");
}

#[tokio::test]
async fn request_without_a_responder_times_out() {
    let engine = new_engine();

    let err = engine
        .request::<NeverRequested, NeverReplied>(
            NeverRequested,
            |cfg: RequestConfig| RequestConfig {
                expiration: Some(Duration::from_millis(50)),
                ..cfg
            },
            CancellationToken::new(),
        )
        .await
        .expect_err("request should time out with no responder listening");

    assert!(matches!(err, RpcError::Cancelled));
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn cancelling_the_token_cancels_the_request() {
    let engine = new_engine();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .request::<NeverRequested, NeverReplied>(
            NeverRequested,
            |cfg: RequestConfig| RequestConfig {
                expiration: None,
                ..cfg
            },
            cancel,
        )
        .await
        .expect_err("request should observe the already-cancelled token");

    assert!(matches!(err, RpcError::Cancelled));
}

#[tokio::test]
async fn concurrent_requests_reuse_one_subscription() {
    let engine = Arc::new(new_engine());
    let responder_engine = engine.clone();
    let _handle = responder_engine
        .respond::<Ping, Pong, _, _>(
            |req: Ping, _headers, _cancel| async move {
                Ok(Pong {
                    message: req.message,
                })
            },
            |cfg: ResponderConfig| cfg,
            CancellationToken::new(),
        )
        .await
        .expect("hosting responder failed");

    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut handles = Vec::new();
    for i in 0..1000 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .request::<Ping, Pong>(
                    Ping {
                        message: i.to_string(),
                    },
                    |cfg: RequestConfig| cfg,
                    CancellationToken::new(),
                )
                .await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let reply = handle.await.expect("task panicked").expect("request failed");
        assert_eq!(reply.message, i.to_string());
    }

    assert_eq!(engine.subscription_count(), 1);
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn consumer_recovery_invalidates_pending_requests_and_subscriptions() {
    let broker = MockBroker::new();
    let engine = Arc::new(RpcEngine::new(
        broker.clone(),
        Config::default(),
        Arc::new(ConventionalNaming::new()),
        Arc::new(UuidCorrelationIdGenerator),
        Arc::new(AlwaysNonPersistent),
        Arc::new(Utf8TypeNameSerializer),
    ));

    let request_engine = engine.clone();
    let in_flight = tokio::spawn(async move {
        request_engine
            .request::<NeverRequested, NeverReplied>(
                NeverRequested,
                |cfg: RequestConfig| RequestConfig {
                    expiration: Some(Duration::from_secs(30)),
                    ..cfg
                },
                CancellationToken::new(),
            )
            .await
    });

    // Let the request register its pending entry and reply subscription first.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.pending_count(), 1);
    assert_eq!(engine.subscription_count(), 1);

    broker.emit_recovery(RecoveryEvent {
        kind: RecoveryEventKind::Consumer,
    });

    let err = in_flight
        .await
        .expect("task panicked")
        .expect_err("request should fail once the consumer channel recovers");
    assert!(matches!(err, RpcError::ConnectionLost));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.pending_count(), 0);
    assert_eq!(engine.subscription_count(), 0);
}

#[tokio::test]
async fn a_reply_with_an_unknown_correlation_id_is_dropped_silently() {
    let broker = MockBroker::new();
    let pending = PendingTable::new();
    let registry = SubscriptionRegistry::new(broker.clone(), pending.clone());

    let key = RpcKey {
        request_type: "Ping".to_string(),
        response_type: "Pong".to_string(),
    };
    let naming = ConventionalNaming::new();
    let queue_name = registry
        .ensure_reply_queue(key, &naming, 50, CancellationToken::new())
        .await
        .expect("ensure_reply_queue failed");

    // No pending entry was ever registered for this correlation id: the reply consumer
    // must drop it rather than panic or block.
    broker
        .publish(
            "",
            &queue_name,
            PublishSpec {
                reply_to: None,
                correlation_id: Some("stale-correlation-id".to_string()),
                priority: 0,
                headers: Headers::new(),
                delivery_mode: DeliveryMode::NonPersistent,
                expiration: None,
                mandatory: false,
                body: b"{}".to_vec(),
            },
        )
        .await
        .expect("publish failed");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pending.is_empty());
}

#[tokio::test]
async fn non_consumer_recovery_events_are_ignored() {
    let broker = MockBroker::new();
    let engine = Arc::new(RpcEngine::new(
        broker.clone(),
        Config::default(),
        Arc::new(ConventionalNaming::new()),
        Arc::new(UuidCorrelationIdGenerator),
        Arc::new(AlwaysNonPersistent),
        Arc::new(Utf8TypeNameSerializer),
    ));

    let request_engine = engine.clone();
    let in_flight = tokio::spawn(async move {
        request_engine
            .request::<NeverRequested, NeverReplied>(
                NeverRequested,
                |cfg: RequestConfig| RequestConfig {
                    expiration: Some(Duration::from_millis(200)),
                    ..cfg
                },
                CancellationToken::new(),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.pending_count(), 1);

    broker.emit_recovery(RecoveryEvent {
        kind: RecoveryEventKind::Producer,
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A producer-channel recovery must not invalidate anything; the request still times
    // out on its own expiration rather than failing early with `ConnectionLost`.
    assert_eq!(engine.pending_count(), 1);
    let err = in_flight.await.expect("task panicked").expect_err("should time out");
    assert!(matches!(err, RpcError::Cancelled));
}

#[tokio::test]
async fn a_late_reply_after_cancellation_is_dropped_not_faulted() {
    let engine = Arc::new(new_engine());
    let cancel = CancellationToken::new();
    let request_engine = engine.clone();
    let request_cancel = cancel.clone();
    let in_flight = tokio::spawn(async move {
        request_engine
            .request::<Ping, Pong>(
                Ping {
                    message: "hello".to_string(),
                },
                |cfg: RequestConfig| RequestConfig {
                    expiration: None,
                    ..cfg
                },
                request_cancel,
            )
            .await
    });

    // Let the request register its pending entry and reply subscription, then cancel it
    // before any responder ever replies.
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let err = in_flight
        .await
        .expect("task panicked")
        .expect_err("cancelled request should fail");
    assert!(matches!(err, RpcError::Cancelled));
    // The pending entry was removed on cancellation; a reply arriving afterwards (were one
    // to be published) would find no matching entry and be dropped, never double-completing
    // the already-resolved awaitable above.
    assert_eq!(engine.pending_count(), 0);
}

/// Test double that always reports a 256-byte serialized name, regardless of the type it is
/// asked about, so `respond`'s validation step can be exercised without depending on
/// `std::any::type_name`'s actual output for any particular type.
struct OversizedTypeNameSerializer;

impl TypeNameSerializer for OversizedTypeNameSerializer {
    fn serialize(&self, _type_name: &TypeName) -> Vec<u8> {
        vec![0u8; 256]
    }
}

#[tokio::test]
async fn a_response_type_serializing_over_the_byte_cap_fails_setup_with_no_declarations() {
    let broker = MockBroker::new();
    let engine = RpcEngine::new(
        broker.clone(),
        Config::default(),
        Arc::new(ConventionalNaming::new()),
        Arc::new(UuidCorrelationIdGenerator),
        Arc::new(AlwaysNonPersistent),
        Arc::new(OversizedTypeNameSerializer),
    );

    let err = engine
        .respond::<Ping, Pong, _, _>(
            |req: Ping, _headers, _cancel| async move {
                Ok(Pong {
                    message: req.message,
                })
            },
            |cfg: ResponderConfig| cfg,
            CancellationToken::new(),
        )
        .await
        .expect_err("oversized response type name should fail setup immediately");

    assert!(matches!(err, RpcError::ArgumentOutOfRange));
    assert_eq!(broker.exchange_count().await, 0);
}
