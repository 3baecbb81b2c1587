// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests: queue, coordinator and transport together.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use serde_json::json;
use tempfile::tempdir;

use crate::test_helpers::{
    events, make_coordinator, record_events, test_config, wait_until, MockTransport,
};
use crate::{
    ConflictStrategy, EntityType, MemoryStore, Method, MutationType, SqliteStore, SyncConfig,
    SyncEvent, SyncState,
};

#[tokio::test(start_paused = true)]
async fn offline_create_syncs_when_connectivity_returns() {
    let transport = MockTransport::offline();
    let coordinator = make_coordinator(test_config(), MemoryStore::new(), transport.clone());
    let log = record_events(&coordinator);
    coordinator.start().unwrap();

    coordinator
        .queue()
        .enqueue(
            EntityType::Position,
            MutationType::Create,
            json!({ "symbol": "SPX" }),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(coordinator.state(), SyncState::Offline);

    transport.set_online(true);
    assert_eq!(coordinator.state(), SyncState::Idle);
    assert!(wait_until(|| events(&log).len() == 3).await);

    let states: Vec<SyncState> = log.lock().unwrap().iter().map(|(_, s)| *s).collect();
    assert_eq!(
        states,
        vec![SyncState::Syncing, SyncState::Syncing, SyncState::Idle]
    );
    assert_eq!(coordinator.state(), SyncState::Idle);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://api.test/v1/positions");
    assert_eq!(requests[0].request.method, Method::Post);
    assert_eq!(requests[0].request.body, Some(json!({ "symbol": "SPX" })));
    assert!(coordinator.queue().get_all().await.unwrap().is_empty());

    coordinator.stop();
}

#[tokio::test(start_paused = true)]
async fn repeated_server_errors_drop_mutation() {
    let transport = MockTransport::online();
    transport.respond_times(3, 500, json!({ "error": "internal" }));
    let coordinator = make_coordinator(test_config(), MemoryStore::new(), transport.clone());
    let log = record_events(&coordinator);

    coordinator
        .queue()
        .enqueue(
            EntityType::Position,
            MutationType::Create,
            json!({ "symbol": "SPX" }),
            None,
            None,
        )
        .await
        .unwrap();
    coordinator.sync().await;

    let failures: Vec<bool> = events(&log)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::MutationFailed { will_retry, .. } => Some(will_retry),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![true, true, false]);
    assert_eq!(transport.request_count(), 3);
    assert!(coordinator.queue().get_all().await.unwrap().is_empty());
    assert_eq!(coordinator.state(), SyncState::Idle);
}

#[tokio::test(start_paused = true)]
async fn manual_conflict_stays_queued() {
    let transport = MockTransport::online();
    transport.respond(409, json!({ "id": "p1", "qty": 5 }));
    let config = SyncConfig {
        conflict_strategy: ConflictStrategy::Manual,
        ..test_config()
    };
    let coordinator = make_coordinator(config, MemoryStore::new(), transport.clone());

    coordinator
        .queue()
        .enqueue(
            EntityType::Position,
            MutationType::Update,
            json!({ "qty": 4 }),
            Some("p1".into()),
            None,
        )
        .await
        .unwrap();
    coordinator.sync().await;

    let queued = coordinator.queue().get_all().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].entity_id.as_deref(), Some("p1"));
    assert!(coordinator
        .queue()
        .has_pending(&EntityType::Position, "p1")
        .await
        .unwrap());
    assert_eq!(transport.request_count(), 1);
    assert!(!transport.requests()[0].url.contains("force"));
    assert_eq!(coordinator.state(), SyncState::Idle);
}

#[tokio::test(start_paused = true)]
async fn conflict_strategies_choose_retransmission() {
    for (strategy, expected_requests) in [
        (ConflictStrategy::ServerWins, 1),
        (ConflictStrategy::ClientWins, 2),
    ] {
        let transport = MockTransport::online();
        transport.respond(409, json!({}));
        let config = SyncConfig {
            conflict_strategy: strategy,
            ..test_config()
        };
        let coordinator = make_coordinator(config, MemoryStore::new(), transport.clone());
        coordinator
            .queue()
            .enqueue(
                EntityType::Strategy,
                MutationType::Delete,
                json!(null),
                Some("s1".into()),
                None,
            )
            .await
            .unwrap();

        coordinator.sync().await;

        assert_eq!(transport.request_count(), expected_requests, "{}", strategy);
        let forced = transport
            .requests()
            .iter()
            .filter(|r| r.url == "http://api.test/v1/strategies/s1?force=true")
            .count();
        assert_eq!(forced, expected_requests - 1, "{}", strategy);
        assert_eq!(coordinator.queue().count().await.unwrap(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let transport = MockTransport::online();
    let coordinator = make_coordinator(test_config(), MemoryStore::new(), transport.clone());

    coordinator.start().unwrap();
    coordinator.start().unwrap();

    assert!(coordinator.is_running());
    assert_eq!(transport.subscriber_count(), 1);
    coordinator.stop();
}

#[tokio::test]
async fn queue_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sync.db");
    let transport = MockTransport::offline();

    let created = {
        let store = SqliteStore::open(&path).unwrap();
        let coordinator = make_coordinator(test_config(), store, transport.clone());
        coordinator.sync().await;
        coordinator
            .queue()
            .enqueue(
                EntityType::Position,
                MutationType::Create,
                json!({ "symbol": "NDX" }),
                None,
                Some("tmp-1".into()),
            )
            .await
            .unwrap()
    };

    let store = SqliteStore::open(&path).unwrap();
    let coordinator = make_coordinator(test_config(), store, transport.clone());
    assert_eq!(coordinator.queue().get_all().await.unwrap(), vec![created]);

    transport.set_online(true);
    coordinator.sync().await;

    assert_eq!(transport.request_count(), 1);
    assert_eq!(coordinator.queue().count().await.unwrap(), 0);

    let reopened = make_coordinator(test_config(), SqliteStore::open(&path).unwrap(), transport);
    assert_eq!(reopened.queue().count().await.unwrap(), 0);
}
