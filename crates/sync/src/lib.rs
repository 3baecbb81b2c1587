// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline mutation sync for the strategy client.
//!
//! Local writes that cannot be confirmed right away are queued durably and
//! replayed against the remote authority once it is reachable.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ SyncCoordinator │────►│  Transport  │────►│   Remote    │
//! │  (drain loop)   │◄────│   (trait)   │◄────│   (REST)    │
//! └─────────────────┘     └─────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌─────────────────┐     ┌─────────────┐
//! │  MutationQueue  │────►│   KvStore   │
//! │     (FIFO)      │     │   (trait)   │
//! └─────────────────┘     └─────────────┘
//! ```
//!
//! # Features
//!
//! - Durable FIFO queue persisted as a single value per store
//! - One drain pass at a time, one mutation in flight at a time
//! - Fixed-delay retry with a ceiling, then drop
//! - 409 conflicts routed to a handler or a default strategy
//! - Periodic and connectivity-triggered passes
//! - Injectable store and transport traits for testing

mod config;
mod conflict;
mod coordinator;
mod observer;
mod queue;
mod transport;

pub use config::{ConfigError, SyncConfig};
pub use conflict::{ConflictAction, ConflictHandler, ConflictStrategy, Resolution};
pub use coordinator::{
    build_request, endpoint, force_url, SyncCoordinator, SyncError, SyncEvent, SyncResult,
    SyncState, FORCE_PARAM,
};
pub use observer::{ObserverId, ObserverList, Subscription};
pub use queue::{MutationQueue, QueueError, QueueResult, DEFAULT_MAX_RETRIES, QUEUE_KEY};
pub use ss_core::{EntityType, KvStore, MemoryStore, MutationType, QueuedMutation, SqliteStore};
pub use transport::{
    decode_body, Connectivity, HttpTransport, Method, OnlineHandler, Request, Response, Transport,
    TransportError, TransportResult, STATUS_CONFLICT,
};

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
mod integration_tests;
