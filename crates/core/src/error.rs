// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for ss-core operations.

use thiserror::Error;

/// All possible errors that can occur in ss-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid entity type: '{0}'\n  hint: entity types are lowercase words joined by '_' (e.g. position, legacy_strategy)")]
    InvalidEntityType(String),

    #[error("invalid mutation type: '{0}'\n  hint: valid types are: create, update, delete")]
    InvalidMutationType(String),

    #[error("invalid store key: '{0}'")]
    InvalidKey(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// A specialized Result type for ss-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
