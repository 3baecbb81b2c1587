// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Pending local writes awaiting transmission.
//!
//! A [`QueuedMutation`] is the unit of durability and retry: one create,
//! update, or delete aimed at a single remote entity. The queue serializes
//! the whole ordered list under one key, so the serde shape below is the
//! persisted format (camelCase field names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for a queued mutation.
///
/// Generated at enqueue time and never reassigned.
pub type MutationId = String;

/// Resource family a mutation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityType {
    /// An open or closed options position.
    Position,
    /// A saved strategy.
    Strategy,
    /// A strategy stored in the pre-v2 format.
    LegacyStrategy,
    /// Any other resource family, identified by its lowercase tag.
    Other(String),
}

impl EntityType {
    /// Returns the tag used in storage and display.
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Position => "position",
            EntityType::Strategy => "strategy",
            EntityType::LegacyStrategy => "legacy_strategy",
            EntityType::Other(tag) => tag,
        }
    }

    /// Returns the pluralized collection path for this entity type.
    ///
    /// Legacy strategies live in the same collection as current ones.
    pub fn resource_path(&self) -> String {
        match self {
            EntityType::Position => "positions".to_string(),
            EntityType::Strategy | EntityType::LegacyStrategy => "strategies".to_string(),
            EntityType::Other(tag) => pluralize(&tag.replace('_', "-")),
        }
    }
}

fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh")
    {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.starts_with('_')
        && !tag.ends_with('_')
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "position" => Ok(EntityType::Position),
            "strategy" => Ok(EntityType::Strategy),
            "legacy_strategy" => Ok(EntityType::LegacyStrategy),
            other if is_valid_tag(other) => Ok(EntityType::Other(other.to_string())),
            _ => Err(Error::InvalidEntityType(s.to_string())),
        }
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl TryFrom<String> for EntityType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Kind of write a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationType {
    Create,
    Update,
    Delete,
}

impl MutationType {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationType::Create => "create",
            MutationType::Update => "update",
            MutationType::Delete => "delete",
        }
    }

    /// Whether the mutation addresses an existing remote entity by id.
    ///
    /// Creates never do: the remote id is not known until the create lands.
    pub fn requires_entity_id(&self) -> bool {
        !matches!(self, MutationType::Create)
    }

    /// Whether the payload is sent as the request body.
    pub fn sends_payload(&self) -> bool {
        !matches!(self, MutationType::Delete)
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MutationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(MutationType::Create),
            "update" => Ok(MutationType::Update),
            "delete" => Ok(MutationType::Delete),
            _ => Err(Error::InvalidMutationType(s.to_string())),
        }
    }
}

/// A single pending write awaiting transmission to the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Unique identifier, assigned at enqueue.
    pub id: MutationId,
    /// When the mutation was enqueued. Informational only.
    pub queued_at: DateTime<Utc>,
    /// Resource family targeted.
    pub entity_type: EntityType,
    /// Create, update, or delete.
    pub mutation_type: MutationType,
    /// Remote id for updates and deletes; absent for creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Write body, interpreted only when transmitted.
    pub payload: Value,
    /// Failed transmission attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Most recent failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Local id of the optimistically rendered entity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_id: Option<String>,
}

impl QueuedMutation {
    /// Creates a mutation with a fresh id and the current time.
    pub fn new(
        entity_type: EntityType,
        mutation_type: MutationType,
        payload: Value,
        entity_id: Option<String>,
        optimistic_id: Option<String>,
    ) -> Self {
        QueuedMutation {
            id: Uuid::new_v4().to_string(),
            queued_at: Utc::now(),
            entity_type,
            mutation_type,
            entity_id,
            payload,
            retry_count: 0,
            last_error: None,
            optimistic_id,
        }
    }

    /// Returns true if this mutation targets the given remote entity.
    pub fn targets(&self, entity_type: &EntityType, entity_id: &str) -> bool {
        self.entity_type == *entity_type && self.entity_id.as_deref() == Some(entity_id)
    }
}

#[cfg(test)]
#[path = "mutation_tests.rs"]
mod tests;
