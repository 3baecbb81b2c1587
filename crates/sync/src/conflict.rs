// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict policy for 409 responses.
//!
//! When the remote rejects a write because its copy diverged, either an
//! application-supplied [`ConflictHandler`] decides, or the configured
//! [`ConflictStrategy`] does. Neither side is ever merged automatically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ss_core::QueuedMutation;

use crate::config::ConfigError;

/// Decision returned by a conflict handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite the remote by retransmitting with the force flag.
    AcceptLocal,
    /// Keep the remote state and discard the local mutation.
    AcceptRemote,
    /// Leave it to the normal retry policy; nothing is merged here.
    Merge,
}

/// Policy used when no conflict handler is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Force the local version onto the remote.
    ClientWins,
    /// Discard the local mutation.
    #[default]
    ServerWins,
    /// Keep the mutation queued until someone resolves it by hand.
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "client_wins" => Ok(ConflictStrategy::ClientWins),
            "server_wins" => Ok(ConflictStrategy::ServerWins),
            "manual" => Ok(ConflictStrategy::Manual),
            _ => Err(ConfigError::InvalidStrategy(s.to_string())),
        }
    }
}

/// Application hook consulted on every conflict.
///
/// Receives the local mutation and the remote's current representation
/// (the 409 response body).
pub trait ConflictHandler: Send + Sync {
    fn resolve(&self, local: &QueuedMutation, remote: &Value) -> Resolution;
}

impl<F> ConflictHandler for F
where
    F: Fn(&QueuedMutation, &Value) -> Resolution + Send + Sync,
{
    fn resolve(&self, local: &QueuedMutation, remote: &Value) -> Resolution {
        self(local, remote)
    }
}

/// What the coordinator does with a conflicted mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Retransmit with the force flag; that request's outcome is final.
    Force,
    /// Treat as synced without retransmitting.
    Discard,
    /// Count as an ordinary failed attempt.
    Retry,
    /// Leave queued for manual intervention and end the pass.
    Hold,
}

/// Decide the action for a conflict.
///
/// A registered handler always wins over the default strategy.
pub fn decide(
    handler: Option<&dyn ConflictHandler>,
    strategy: ConflictStrategy,
    local: &QueuedMutation,
    remote: &Value,
) -> ConflictAction {
    match handler.map(|h| h.resolve(local, remote)) {
        Some(Resolution::AcceptLocal) => ConflictAction::Force,
        Some(Resolution::AcceptRemote) => ConflictAction::Discard,
        Some(Resolution::Merge) => ConflictAction::Retry,
        None => match strategy {
            ConflictStrategy::ClientWins => ConflictAction::Force,
            ConflictStrategy::ServerWins => ConflictAction::Discard,
            ConflictStrategy::Manual => ConflictAction::Hold,
        },
    }
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
