// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue of mutations awaiting transmission.
//!
//! The whole ordered list is stored as one JSON array under [`QUEUE_KEY`].
//! It is loaded from the store on first access and rewritten after every
//! structural change. A change is committed to the in-memory copy only after
//! the store accepted it, so a failed write leaves both sides at the last
//! completed state.

use serde_json::Value;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::debug;

use ss_core::{EntityType, KvStore, MutationType, QueuedMutation};

/// Store key holding the serialized queue.
pub const QUEUE_KEY: &str = "mutation_queue";

/// Default number of failed attempts before a mutation is given up on.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Underlying store failed.
    #[error("storage error: {0}")]
    Store(#[from] ss_core::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Mutation shape is inconsistent with its type.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// FIFO queue of pending mutations persisted through a [`KvStore`].
pub struct MutationQueue<S: KvStore> {
    store: S,
    max_retries: u32,
    /// `None` until the first access loads from the store.
    entries: Mutex<Option<Vec<QueuedMutation>>>,
}

impl<S: KvStore> MutationQueue<S> {
    /// Create a queue over the given store with the default retry ceiling.
    pub fn new(store: S) -> Self {
        Self::with_max_retries(store, DEFAULT_MAX_RETRIES)
    }

    /// Create a queue with a custom retry ceiling.
    pub fn with_max_retries(store: S, max_retries: u32) -> Self {
        MutationQueue {
            store,
            max_retries: max_retries.max(1),
            entries: Mutex::new(None),
        }
    }

    /// The retry ceiling applied by [`mark_failed`](Self::mark_failed).
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Append a new mutation at the tail and persist it.
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        mutation_type: MutationType,
        payload: Value,
        entity_id: Option<String>,
        optimistic_id: Option<String>,
    ) -> QueueResult<QueuedMutation> {
        match (mutation_type.requires_entity_id(), &entity_id) {
            (false, Some(id)) => {
                return Err(QueueError::InvalidMutation(format!(
                    "{} of {} must not carry an entity id (got '{}')",
                    mutation_type, entity_type, id
                )));
            }
            (true, None) => {
                return Err(QueueError::InvalidMutation(format!(
                    "{} of {} requires an entity id",
                    mutation_type, entity_type
                )));
            }
            _ => {}
        }

        let mutation = QueuedMutation::new(
            entity_type,
            mutation_type,
            payload,
            entity_id,
            optimistic_id,
        );

        let mut entries = self.lock_loaded().await?;
        let mut next = entries.clone();
        next.push(mutation.clone());
        self.save(&next).await?;
        *entries = next;

        debug!(
            "Enqueued {} {} ({} pending)",
            mutation.mutation_type,
            mutation.entity_type,
            entries.len()
        );
        Ok(mutation)
    }

    /// Return the head of the queue without removing it.
    pub async fn peek(&self) -> QueueResult<Option<QueuedMutation>> {
        Ok(self.lock_loaded().await?.first().cloned())
    }

    /// Remove the mutation with the given id, wherever it sits.
    ///
    /// No-op if the id is not queued.
    pub async fn dequeue(&self, id: &str) -> QueueResult<()> {
        self.remove(id).await.map(|_| ())
    }

    /// Record a failed attempt.
    ///
    /// Increments the retry count and stores the error. Once the count
    /// reaches the ceiling the mutation is moved to the tail. Returns whether
    /// the caller should keep retrying; unknown ids return `false`.
    pub async fn mark_failed(&self, id: &str, error: &str) -> QueueResult<bool> {
        let mut entries = self.lock_loaded().await?;
        let Some(index) = entries.iter().position(|m| m.id == id) else {
            return Ok(false);
        };

        let mut next = entries.clone();
        let mut mutation = next.remove(index);
        mutation.retry_count = mutation.retry_count.saturating_add(1);
        mutation.last_error = Some(error.to_string());
        let should_retry = mutation.retry_count < self.max_retries;

        if should_retry {
            next.insert(index, mutation);
        } else {
            debug!(
                "Mutation {} reached {} failed attempts, moving to tail",
                id, self.max_retries
            );
            next.push(mutation);
        }

        self.save(&next).await?;
        *entries = next;
        Ok(should_retry)
    }

    /// Record an error on a mutation without counting an attempt.
    ///
    /// The mutation keeps its position. Returns whether the id was queued.
    pub async fn record_error(&self, id: &str, error: &str) -> QueueResult<bool> {
        let mut entries = self.lock_loaded().await?;
        let Some(index) = entries.iter().position(|m| m.id == id) else {
            return Ok(false);
        };

        let mut next = entries.clone();
        next[index].last_error = Some(error.to_string());
        self.save(&next).await?;
        *entries = next;
        Ok(true)
    }

    /// Snapshot of every queued mutation in order.
    pub async fn get_all(&self) -> QueueResult<Vec<QueuedMutation>> {
        Ok(self.lock_loaded().await?.clone())
    }

    /// Queued mutations targeting one remote entity, in order.
    pub async fn get_for_entity(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
    ) -> QueueResult<Vec<QueuedMutation>> {
        Ok(self
            .lock_loaded()
            .await?
            .iter()
            .filter(|m| m.targets(entity_type, entity_id))
            .cloned()
            .collect())
    }

    /// Whether any mutation targeting the entity is still queued.
    pub async fn has_pending(&self, entity_type: &EntityType, entity_id: &str) -> QueueResult<bool> {
        Ok(self
            .lock_loaded()
            .await?
            .iter()
            .any(|m| m.targets(entity_type, entity_id)))
    }

    /// Number of queued mutations.
    pub async fn count(&self) -> QueueResult<usize> {
        Ok(self.lock_loaded().await?.len())
    }

    /// Remove a mutation by id. Returns whether it was present.
    pub async fn remove(&self, id: &str) -> QueueResult<bool> {
        let mut entries = self.lock_loaded().await?;
        if !entries.iter().any(|m| m.id == id) {
            return Ok(false);
        }

        let next: Vec<QueuedMutation> = entries.iter().filter(|m| m.id != id).cloned().collect();
        self.save(&next).await?;
        *entries = next;

        debug!("Removed mutation {} ({} pending)", id, entries.len());
        Ok(true)
    }

    /// Remove every queued mutation.
    pub async fn clear(&self) -> QueueResult<()> {
        let mut entries = self.lock_loaded().await?;
        self.save(&[]).await?;
        entries.clear();
        Ok(())
    }

    /// Drop the in-memory copy so the next access re-reads the store.
    pub async fn reload(&self) {
        *self.entries.lock().await = None;
    }

    async fn lock_loaded(&self) -> QueueResult<MappedMutexGuard<'_, Vec<QueuedMutation>>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(MutexGuard::map(guard, |entries| {
            entries.get_or_insert_with(Vec::new)
        }))
    }

    async fn load(&self) -> QueueResult<Vec<QueuedMutation>> {
        match self.store.get(QUEUE_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => {
                let entries: Vec<QueuedMutation> = serde_json::from_str(&raw)?;
                debug!("Loaded {} queued mutations", entries.len());
                Ok(entries)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn save(&self, entries: &[QueuedMutation]) -> QueueResult<()> {
        let json = serde_json::to_string(entries)?;
        self.store.set(QUEUE_KEY, json).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
