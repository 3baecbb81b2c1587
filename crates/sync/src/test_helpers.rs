// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use ss_core::{KvStore, MemoryStore};

use crate::config::SyncConfig;
use crate::coordinator::{SyncCoordinator, SyncEvent, SyncState};
use crate::observer::Subscription;
use crate::transport::{
    Connectivity, OnlineHandler, Request, Response, Transport, TransportError, TransportResult,
};

pub const BASE_URL: &str = "http://api.test/v1";

/// A request captured by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub request: Request,
}

struct MockState {
    responses: Mutex<VecDeque<TransportResult<Response>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    connectivity: Connectivity,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

/// Scripted transport: replies with queued responses, then 200 `{}`.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new(online: bool) -> Self {
        MockTransport {
            state: Arc::new(MockState {
                responses: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                connectivity: Connectivity::new(online),
                gate: Mutex::new(None),
            }),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Queue a response for the next unanswered request.
    pub fn respond(&self, status: u16, data: Value) {
        self.state
            .responses
            .lock()
            .unwrap()
            .push_back(Ok(Response::new(status, data)));
    }

    /// Queue the same response several times.
    pub fn respond_times(&self, times: usize, status: u16, data: Value) {
        for _ in 0..times {
            self.respond(status, data.clone());
        }
    }

    /// Queue a network failure.
    pub fn fail_network(&self, message: &str) {
        self.state
            .responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Network(message.to_string())));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn set_online(&self, online: bool) -> bool {
        self.state.connectivity.set_online(online)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.connectivity.subscriber_count()
    }

    /// Make every request wait for a permit from [`release`](Self::release).
    pub fn hold_requests(&self) {
        *self.state.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = self.state.gate.lock().unwrap().as_ref() {
            gate.add_permits(permits);
        }
    }
}

impl Transport for MockTransport {
    fn request(&self, url: &str, request: Request) -> BoxFuture<'_, TransportResult<Response>> {
        let url = url.to_string();
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            state.requests.lock().unwrap().push(RecordedRequest {
                url,
                request,
            });

            let gate = state.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
            }

            let scripted = state.responses.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(Response::new(200, json!({}))))
        })
    }

    fn is_online(&self) -> bool {
        self.state.connectivity.is_online()
    }

    fn on_online_change(&self, handler: OnlineHandler) -> Subscription {
        self.state.connectivity.subscribe(handler)
    }
}

/// Memory store whose reads or writes can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn injected() -> ss_core::Error {
    ss_core::Error::Io(std::io::Error::other("injected storage failure"))
}

impl KvStore for FlakyStore {
    fn get(&self, key: &str) -> BoxFuture<'_, ss_core::Result<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(injected());
            }
            self.inner.get(&key).await
        })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'_, ss_core::Result<()>> {
        let key = key.to_string();
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(injected());
            }
            self.inner.set(&key, value).await
        })
    }
}

/// Config with short delays for tests.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        base_url: BASE_URL.to_string(),
        retry_delay_ms: 10,
        ..SyncConfig::default()
    }
}

pub fn make_coordinator<S: KvStore + 'static>(
    config: SyncConfig,
    store: S,
    transport: MockTransport,
) -> SyncCoordinator<S, MockTransport> {
    SyncCoordinator::new(config, store, transport, || Some("test-token".to_string()))
}

/// Record every event together with the coordinator state at emission.
pub fn record_events<S: KvStore + 'static>(
    coordinator: &SyncCoordinator<S, MockTransport>,
) -> Arc<Mutex<Vec<(SyncEvent, SyncState)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_in_handler = Arc::clone(&log);
    let observed = coordinator.clone();
    let _subscription = coordinator.on_event(move |event| {
        log_in_handler
            .lock()
            .unwrap()
            .push((event.clone(), observed.state()));
    });
    log
}

/// Events only, in order.
pub fn events(log: &Arc<Mutex<Vec<(SyncEvent, SyncState)>>>) -> Vec<SyncEvent> {
    log.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
}

/// Poll `condition` while letting spawned tasks and timers run.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..2000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}
