// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ss-core: Shared types for the stratsync offline mutation layer
//!
//! This crate provides the queued-mutation data model and the durable
//! key-value storage abstraction the mutation queue persists through.

pub mod error;
pub mod mutation;
pub mod store;

pub use error::{Error, Result};
pub use mutation::{EntityType, MutationId, MutationType, QueuedMutation};
pub use store::{KvStore, MemoryStore, SqliteStore};
