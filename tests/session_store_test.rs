// ABOUTME: Integration tests for the file-backed and in-memory session stores
// ABOUTME: Covers complete-object writes, overwrite semantics, and malformed files
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

mod common;

use common::init_test_logging;
use scale_sync::errors::SyncError;
use scale_sync::store::{
    FileSessionStore, MemorySessionStore, SessionStore, GARMIN_SESSION_KEY,
    WITHINGS_REFRESH_TOKEN_KEY,
};
use std::collections::HashMap;

#[tokio::test]
async fn file_store_round_trips_values() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path().join("sessions.json"));

    assert_eq!(store.get(WITHINGS_REFRESH_TOKEN_KEY).await.unwrap(), None);

    store
        .put(WITHINGS_REFRESH_TOKEN_KEY, "refresh-abc")
        .await
        .unwrap();
    assert_eq!(
        store.get(WITHINGS_REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("refresh-abc")
    );
}

#[tokio::test]
async fn file_store_put_replaces_previous_value() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path().join("sessions.json"));

    store.put(WITHINGS_REFRESH_TOKEN_KEY, "first").await.unwrap();
    store.put(WITHINGS_REFRESH_TOKEN_KEY, "second").await.unwrap();

    assert_eq!(
        store.get(WITHINGS_REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("second")
    );
}

#[tokio::test]
async fn file_store_keeps_keys_independent() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path().join("sessions.json"));

    store.put(WITHINGS_REFRESH_TOKEN_KEY, "refresh-abc").await.unwrap();
    store
        .put(GARMIN_SESSION_KEY, r#"{"oauth1_token":"t"}"#)
        .await
        .unwrap();
    // Rewriting one key leaves the other untouched
    store.put(WITHINGS_REFRESH_TOKEN_KEY, "refresh-def").await.unwrap();

    assert_eq!(
        store.get(GARMIN_SESSION_KEY).await.unwrap().as_deref(),
        Some(r#"{"oauth1_token":"t"}"#)
    );
}

#[tokio::test]
async fn file_store_creates_parent_directories_on_first_write() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("state").join("deep").join("sessions.json");
    let store = FileSessionStore::new(&nested);

    store.put(GARMIN_SESSION_KEY, "session").await.unwrap();

    assert!(nested.exists());
    assert_eq!(
        store.get(GARMIN_SESSION_KEY).await.unwrap().as_deref(),
        Some("session")
    );
}

#[tokio::test]
async fn file_store_persists_a_complete_document() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    let store = FileSessionStore::new(&path);

    store.put(WITHINGS_REFRESH_TOKEN_KEY, "refresh-abc").await.unwrap();
    store.put(GARMIN_SESSION_KEY, "session-blob").await.unwrap();

    // The on-disk artifact is a single well-formed JSON object
    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    let parsed: HashMap<String, String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[WITHINGS_REFRESH_TOKEN_KEY], "refresh-abc");
    assert_eq!(parsed[GARMIN_SESSION_KEY], "session-blob");

    // No stale temporary file left behind
    assert!(!path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn file_store_reports_malformed_documents() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    tokio::fs::write(&path, "not json").await.unwrap();

    let store = FileSessionStore::new(&path);
    let err = store.get(WITHINGS_REFRESH_TOKEN_KEY).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
}

#[tokio::test]
async fn memory_store_round_trips_and_overwrites() {
    init_test_logging();
    let store = MemorySessionStore::new();

    assert_eq!(store.get("k").await.unwrap(), None);
    store.put("k", "v1").await.unwrap();
    store.put("k", "v2").await.unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
}

#[tokio::test]
async fn memory_store_can_be_preseeded() {
    init_test_logging();
    let mut entries = HashMap::new();
    entries.insert(WITHINGS_REFRESH_TOKEN_KEY.to_string(), "seeded".to_string());
    let store = MemorySessionStore::with_entries(entries);

    assert_eq!(
        store.get(WITHINGS_REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("seeded")
    );
}
