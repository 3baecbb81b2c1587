// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync coordinator: drains the mutation queue against the remote.
//!
//! One drain pass at a time per coordinator. Within a pass, mutations are
//! taken from the head of the queue and transmitted one by one:
//!
//! ```text
//!   peek ──► transmit ──► ok ────────► dequeue, emit synced ──► peek
//!                │
//!                ├──► 409 ──► conflict policy (force / discard / retry / hold)
//!                │
//!                └──► error ─► mark_failed ─┬─► retries left: wait, peek
//!                                           └─► exhausted: dequeue, peek
//! ```
//!
//! Passes are started by [`SyncCoordinator::sync`], by the periodic timer,
//! and by connectivity coming back. Storage failures abort the pass and put
//! the coordinator in [`SyncState::Error`]; everything else is reported
//! through events.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ss_core::{KvStore, QueuedMutation};

use crate::config::SyncConfig;
use crate::conflict::{self, ConflictAction, ConflictHandler};
use crate::observer::{ObserverList, Subscription};
use crate::queue::{MutationQueue, QueueError};
use crate::transport::{Method, OnlineHandler, Request, Response, Transport};

/// Query flag telling the remote to accept the local version.
pub const FORCE_PARAM: &str = "force=true";

/// Error type for sync coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Scheduling needs a tokio runtime.
    #[error("no tokio runtime available to schedule sync passes")]
    NoRuntime,
}

/// Result type for sync coordinator operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// State of the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// The transport reports no connectivity.
    Offline,
    /// A drain pass is running.
    Syncing,
    /// The last pass was aborted by a storage failure.
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Offline => "offline",
            SyncState::Syncing => "syncing",
            SyncState::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle notifications emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A drain pass began.
    SyncStarted,
    /// A drain pass ran out of work (or parked on a held conflict).
    SyncCompleted { synced: usize, failed: usize },
    /// A mutation reached the remote (or the remote version was kept).
    MutationSynced { mutation: QueuedMutation },
    /// An attempt failed. `mutation` reflects the recorded failure;
    /// `will_retry` is false when the mutation is being dropped. A conflict
    /// held for manual resolution reports `will_retry` without counting an
    /// attempt.
    MutationFailed {
        mutation: QueuedMutation,
        error: String,
        will_retry: bool,
    },
    /// A pass was aborted by an unexpected failure.
    SyncError { error: String },
}

impl SyncEvent {
    /// One-line description for logs.
    pub fn description(&self) -> String {
        match self {
            SyncEvent::SyncStarted => "SyncStarted".to_string(),
            SyncEvent::SyncCompleted { synced, failed } => {
                format!("SyncCompleted: {} synced, {} failed", synced, failed)
            }
            SyncEvent::MutationSynced { mutation } => format!(
                "MutationSynced: {} {} ({})",
                mutation.mutation_type, mutation.entity_type, mutation.id
            ),
            SyncEvent::MutationFailed {
                mutation,
                error,
                will_retry,
            } => format!(
                "MutationFailed: {} {} ({}) attempt {}: {}{}",
                mutation.mutation_type,
                mutation.entity_type,
                mutation.id,
                mutation.retry_count,
                error,
                if *will_retry { "" } else { " [dropped]" }
            ),
            SyncEvent::SyncError { error } => format!("SyncError: {}", error),
        }
    }
}

/// Supplies the bearer token at request time.
type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// What the pass driver does after one mutation attempt.
#[derive(Debug)]
enum PassStep {
    /// Move on to the next head immediately.
    Continue,
    /// Sleep the retry delay, then peek again.
    WaitAndRetry,
    /// End the pass normally, leaving the head where it is.
    Park,
    /// End the pass with an error.
    Abort(SyncError),
}

/// Result of transmitting one mutation.
#[derive(Debug)]
enum Outcome {
    Synced,
    Failed(String),
    Held(String),
}

#[derive(Debug, Default)]
struct PassStats {
    synced: usize,
    failed: usize,
}

/// Timer and connectivity registration while started.
struct Schedule {
    cancel: CancellationToken,
    connectivity: Subscription,
}

struct Inner<S: KvStore, T: Transport> {
    config: SyncConfig,
    queue: Arc<MutationQueue<S>>,
    transport: T,
    token: TokenProvider,
    state: Mutex<SyncState>,
    in_pass: AtomicBool,
    events: ObserverList<SyncEvent>,
    conflict_handler: RwLock<Option<Arc<dyn ConflictHandler>>>,
    schedule: Mutex<Option<Schedule>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn transition(current: &mut SyncState, next: SyncState) {
    let previous = std::mem::replace(current, next);
    if previous != next {
        debug!("Sync state: {} -> {}", previous, next);
    }
}

/// Clears the in-pass flag however the pass ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the mutation queue to the remote authority.
///
/// Cloning yields another handle to the same coordinator.
pub struct SyncCoordinator<S: KvStore + 'static, T: Transport + 'static> {
    inner: Arc<Inner<S, T>>,
}

impl<S: KvStore + 'static, T: Transport + 'static> Clone for SyncCoordinator<S, T> {
    fn clone(&self) -> Self {
        SyncCoordinator {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: KvStore + 'static, T: Transport + 'static> SyncCoordinator<S, T> {
    /// Create a coordinator over `store` and `transport`.
    ///
    /// The queue is built here with the configured retry ceiling; use
    /// [`queue`](Self::queue) to enqueue. `token` is read before every
    /// request; `None` or an empty token omits the Authorization header.
    pub fn new<F>(config: SyncConfig, store: S, transport: T, token: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        let queue = Arc::new(MutationQueue::with_max_retries(store, config.max_retries));
        SyncCoordinator {
            inner: Arc::new(Inner {
                config,
                queue,
                transport,
                token: Arc::new(token),
                state: Mutex::new(SyncState::Idle),
                in_pass: AtomicBool::new(false),
                events: ObserverList::new(),
                conflict_handler: RwLock::new(None),
                schedule: Mutex::new(None),
            }),
        }
    }

    /// The queue this coordinator drains.
    pub fn queue(&self) -> &Arc<MutationQueue<S>> {
        &self.inner.queue
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.inner.state()
    }

    /// Whether the timer and connectivity subscription are registered.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.schedule).is_some()
    }

    /// Register an event observer.
    pub fn on_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Install the handler consulted on conflicts, replacing any previous one.
    pub fn set_conflict_handler<H>(&self, handler: H)
    where
        H: ConflictHandler + 'static,
    {
        *self.inner.write_handler() = Some(Arc::new(handler));
    }

    /// Fall back to the configured conflict strategy.
    pub fn clear_conflict_handler(&self) {
        *self.inner.write_handler() = None;
    }

    /// Begin scheduled syncing.
    ///
    /// Starts a pass right away when online (otherwise enters
    /// [`SyncState::Offline`]), runs a pass every `sync_interval_ms` while
    /// online, and reacts to connectivity changes. Calling it again while
    /// started does nothing.
    pub fn start(&self) -> SyncResult<()> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        {
            let mut schedule = lock(&self.inner.schedule);
            if schedule.is_some() {
                debug!("Sync already started");
                return Ok(());
            }

            let weak = Arc::downgrade(&self.inner);
            let handler_runtime = runtime.clone();
            let handler: OnlineHandler = Box::new(move |online: bool| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_connectivity(online, &handler_runtime);
                }
            });
            let connectivity = self.inner.transport.on_online_change(handler);

            let cancel = CancellationToken::new();
            runtime.spawn(run_timer(
                Arc::downgrade(&self.inner),
                self.inner.config.sync_interval(),
                cancel.clone(),
            ));

            *schedule = Some(Schedule {
                cancel,
                connectivity,
            });
        }

        info!(
            "Sync started (interval {}ms, base {})",
            self.inner.config.sync_interval_ms, self.inner.config.base_url
        );

        if self.inner.transport.is_online() {
            let inner = Arc::clone(&self.inner);
            runtime.spawn(async move { inner.sync().await });
        } else {
            self.inner.set_state(SyncState::Offline);
        }
        Ok(())
    }

    /// Stop scheduling passes.
    ///
    /// A pass already in flight runs to completion; await your own
    /// [`sync`](Self::sync) call if you need it finished.
    pub fn stop(&self) {
        let schedule = lock(&self.inner.schedule).take();
        if let Some(schedule) = schedule {
            schedule.cancel.cancel();
            schedule.connectivity.unsubscribe();
            info!("Sync stopped");
        }
    }

    /// Run one drain pass now.
    ///
    /// Returns immediately if a pass is already running. Failures are
    /// reported through state and events, never returned.
    pub async fn sync(&self) {
        self.inner.sync().await;
    }
}

impl<S: KvStore + 'static, T: Transport + 'static> Inner<S, T> {
    fn state(&self) -> SyncState {
        *lock(&self.state)
    }

    fn set_state(&self, state: SyncState) {
        transition(&mut lock(&self.state), state);
    }

    /// Publish a pass's final state and clear the in-pass flag under one lock.
    fn finish_pass(&self, aborted: bool) {
        let mut state = lock(&self.state);
        let next = if aborted {
            SyncState::Error
        } else if self.transport.is_online() {
            SyncState::Idle
        } else {
            SyncState::Offline
        };
        transition(&mut state, next);
        self.in_pass.store(false, Ordering::Release);
    }

    fn write_handler(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Option<Arc<dyn ConflictHandler>>> {
        self.conflict_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_handler(&self) -> Option<Arc<dyn ConflictHandler>> {
        self.conflict_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn handle_connectivity(self: &Arc<Self>, online: bool, runtime: &Handle) {
        if online {
            info!("Connectivity restored, syncing");
            {
                let mut state = lock(&self.state);
                let next = if self.in_pass.load(Ordering::Acquire) {
                    SyncState::Syncing
                } else {
                    SyncState::Idle
                };
                transition(&mut state, next);
            }
            let inner = Arc::clone(self);
            runtime.spawn(async move { inner.sync().await });
        } else {
            info!("Connectivity lost");
            self.set_state(SyncState::Offline);
        }
    }

    async fn sync(&self) {
        if self.in_pass.swap(true, Ordering::AcqRel) {
            debug!("Sync pass already running");
            return;
        }
        let _guard = PassGuard(&self.in_pass);

        if !self.transport.is_online() {
            self.finish_pass(false);
            return;
        }

        self.set_state(SyncState::Syncing);
        self.events.emit(&SyncEvent::SyncStarted);

        let mut stats = PassStats::default();
        match self.drain(&mut stats).await {
            Ok(()) => {
                self.finish_pass(false);
                if stats.synced > 0 || stats.failed > 0 {
                    info!(
                        "Sync pass complete: {} synced, {} failed",
                        stats.synced, stats.failed
                    );
                }
                self.events.emit(&SyncEvent::SyncCompleted {
                    synced: stats.synced,
                    failed: stats.failed,
                });
            }
            Err(e) => {
                error!("Sync pass aborted: {}", e);
                self.finish_pass(true);
                self.events.emit(&SyncEvent::SyncError {
                    error: e.to_string(),
                });
            }
        }
    }

    async fn drain(&self, stats: &mut PassStats) -> SyncResult<()> {
        loop {
            let Some(mutation) = self.queue.peek().await? else {
                return Ok(());
            };

            match self.process(&mutation, stats).await {
                PassStep::Continue => {}
                PassStep::WaitAndRetry => tokio::time::sleep(self.config.retry_delay()).await,
                PassStep::Park => return Ok(()),
                PassStep::Abort(e) => return Err(e),
            }
        }
    }

    async fn process(&self, mutation: &QueuedMutation, stats: &mut PassStats) -> PassStep {
        match self.transmit(mutation).await {
            Outcome::Synced => {
                if let Err(e) = self.queue.dequeue(&mutation.id).await {
                    return PassStep::Abort(e.into());
                }
                stats.synced += 1;
                debug!(
                    "Synced {} {} ({})",
                    mutation.mutation_type, mutation.entity_type, mutation.id
                );
                self.events.emit(&SyncEvent::MutationSynced {
                    mutation: mutation.clone(),
                });
                PassStep::Continue
            }
            Outcome::Failed(error) => {
                let will_retry = match self.queue.mark_failed(&mutation.id, &error).await {
                    Ok(will_retry) => will_retry,
                    Err(e) => return PassStep::Abort(e.into()),
                };
                stats.failed += 1;
                warn!("Mutation {} failed: {}", mutation.id, error);
                let mut failed = mutation.clone();
                failed.retry_count = failed.retry_count.saturating_add(1);
                self.emit_failed(failed, error, will_retry);

                if will_retry {
                    return PassStep::WaitAndRetry;
                }

                warn!(
                    "Dropping mutation {} after {} failed attempts",
                    mutation.id,
                    self.queue.max_retries()
                );
                if let Err(e) = self.queue.dequeue(&mutation.id).await {
                    return PassStep::Abort(e.into());
                }
                PassStep::Continue
            }
            Outcome::Held(error) => {
                // Held mutations keep their position ahead of later writes.
                if let Err(e) = self.queue.record_error(&mutation.id, &error).await {
                    return PassStep::Abort(e.into());
                }
                stats.failed += 1;
                info!(
                    "Mutation {} left queued for manual conflict resolution",
                    mutation.id
                );
                self.emit_failed(mutation.clone(), error, true);
                PassStep::Park
            }
        }
    }

    fn emit_failed(&self, mut mutation: QueuedMutation, error: String, will_retry: bool) {
        mutation.last_error = Some(error.clone());
        self.events.emit(&SyncEvent::MutationFailed {
            mutation,
            error,
            will_retry,
        });
    }

    async fn transmit(&self, mutation: &QueuedMutation) -> Outcome {
        let url = endpoint(&self.config.base_url, mutation);
        let response = match self.send(&url, mutation).await {
            Ok(response) => response,
            Err(error) => return Outcome::Failed(error),
        };

        if response.ok {
            return Outcome::Synced;
        }
        if response.is_conflict() {
            return self.resolve_conflict(mutation, &url, &response.data).await;
        }
        Outcome::Failed(describe_failure(&response))
    }

    async fn send(&self, url: &str, mutation: &QueuedMutation) -> Result<Response, String> {
        let request = build_request(mutation, (self.token)());
        self.transport
            .request(url, request)
            .await
            .map_err(|e| e.to_string())
    }

    async fn resolve_conflict(
        &self,
        mutation: &QueuedMutation,
        url: &str,
        remote: &Value,
    ) -> Outcome {
        let handler = self.current_handler();
        let strategy = self.config.conflict_strategy;
        let decision = catch_unwind(AssertUnwindSafe(|| {
            conflict::decide(handler.as_deref(), strategy, mutation, remote)
        }));
        let action = match decision {
            Ok(action) => action,
            Err(_) => {
                warn!("Conflict handler panicked for mutation {}", mutation.id);
                return Outcome::Failed("conflict handler panicked".to_string());
            }
        };

        match action {
            ConflictAction::Force => {
                info!("Conflict on {}: overwriting remote", mutation.id);
                match self.send(&force_url(url), mutation).await {
                    Ok(response) if response.ok => Outcome::Synced,
                    Ok(response) => Outcome::Failed(format!(
                        "forced overwrite rejected: {}",
                        describe_failure(&response)
                    )),
                    Err(error) => Outcome::Failed(error),
                }
            }
            ConflictAction::Discard => {
                info!("Conflict on {}: keeping remote version", mutation.id);
                Outcome::Synced
            }
            ConflictAction::Retry => {
                Outcome::Failed("conflict unresolved: merge is not supported".to_string())
            }
            ConflictAction::Hold => {
                Outcome::Held("conflict requires manual resolution".to_string())
            }
        }
    }
}

/// Periodic pass trigger. Exits on cancellation or once the coordinator is gone.
async fn run_timer<S: KvStore + 'static, T: Transport + 'static>(
    inner: Weak<Inner<S, T>>,
    period: Duration,
    cancel: CancellationToken,
) {
    // interval_at rejects a zero period
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.transport.is_online() && inner.state() != SyncState::Syncing {
            inner.sync().await;
        }
    }
}

/// URL a mutation is sent to.
///
/// Creates go to the collection; updates and deletes to the entity.
pub fn endpoint(base_url: &str, mutation: &QueuedMutation) -> String {
    let base = base_url.trim_end_matches('/');
    let collection = mutation.entity_type.resource_path();
    match &mutation.entity_id {
        Some(id) if mutation.mutation_type.requires_entity_id() => {
            format!("{}/{}/{}", base, collection, id)
        }
        _ => format!("{}/{}", base, collection),
    }
}

/// Append the force flag to a URL.
pub fn force_url(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, FORCE_PARAM)
}

/// Request for a mutation: method from its type, payload as body unless it
/// is a delete, bearer token when one is available.
pub fn build_request(mutation: &QueuedMutation, token: Option<String>) -> Request {
    let mut request = Request::new(Method::for_mutation(mutation.mutation_type));
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        request = request.with_header("Authorization", format!("Bearer {}", token));
    }
    if mutation.mutation_type.sends_payload() {
        request = request.with_body(mutation.payload.clone());
    }
    request
}

fn describe_failure(response: &Response) -> String {
    let detail = match &response.data {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => ["error", "message"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
        _ => None,
    };
    match detail {
        Some(detail) => format!("HTTP {}: {}", response.status, detail),
        None => format!("HTTP {}", response.status),
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
