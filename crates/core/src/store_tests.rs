// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::tempdir;

#[tokio::test]
async fn memory_store_get_missing() {
    let store = MemoryStore::new();
    assert_eq!(store.get("queue").await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn memory_store_set_overwrites() {
    let store = MemoryStore::new();
    store.set("queue", "[1]".into()).await.unwrap();
    store.set("queue", "[1,2]".into()).await.unwrap();

    assert_eq!(store.get("queue").await.unwrap().as_deref(), Some("[1,2]"));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn memory_store_clones_share_entries() {
    let store = MemoryStore::new();
    let other = store.clone();
    store.set("k", "v".into()).await.unwrap();
    assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn empty_key_rejected() {
    let store = MemoryStore::new();
    assert!(matches!(store.get("").await, Err(Error::InvalidKey(_))));
    assert!(matches!(
        store.set("bad\nkey", "v".into()).await,
        Err(Error::InvalidKey(_))
    ));
}

#[tokio::test]
async fn sqlite_store_in_memory_roundtrip() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert_eq!(store.get("queue").await.unwrap(), None);

    store.set("queue", "[]".into()).await.unwrap();
    store.set("queue", r#"[{"id":"a"}]"#.into()).await.unwrap();

    assert_eq!(
        store.get("queue").await.unwrap().as_deref(),
        Some(r#"[{"id":"a"}]"#)
    );
}

#[tokio::test]
async fn sqlite_store_keys_are_independent() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("a", "1".into()).await.unwrap();
    store.set("b", "2".into()).await.unwrap();

    assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
}

#[tokio::test]
async fn sqlite_store_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.set("queue", "[\"x\"]".into()).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.get("queue").await.unwrap().as_deref(), Some("[\"x\"]"));
}

#[tokio::test]
async fn sqlite_store_rejects_empty_key() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(matches!(store.get("").await, Err(Error::InvalidKey(_))));
}

#[test]
fn sqlite_store_creates_parent_dirs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a").join("b").join("store.db");

    SqliteStore::open(&path).unwrap();
    assert!(path.exists());
}
