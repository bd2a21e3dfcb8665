//! Unit tests for the schema text and subject/version caches

use std::time::Duration;
use tokio::time::Instant;
use velostream_codec::velostream::schema::{
    CachedSchemaId, CachedSchemaText, SchemaStore, SubjectVersionKey, NO_SCHEMA_ID,
};

#[test]
fn test_subject_version_key_equality() {
    let a = SubjectVersionKey::new("orders", "3");
    let b = SubjectVersionKey::new("orders", "3");
    let c = SubjectVersionKey::new("orders", "4");

    assert_eq!(a, b);
    assert_eq!(a.checksum(), b.checksum());
    assert_ne!(a, c);
    assert_eq!(a.subject(), "orders");
    assert_eq!(a.version(), "3");
}

#[test]
fn test_cached_schema_text_checksum_tracks_text() {
    let first = CachedSchemaText::new("{\"type\":\"string\"}");
    let same = CachedSchemaText::new("{\"type\":\"string\"}");
    let changed = CachedSchemaText::new("{\"type\":\"long\"}");

    assert_eq!(first.checksum(), same.checksum());
    assert_ne!(first.checksum(), changed.checksum());
    assert_eq!(first.checksum(), crc32c::crc32c(first.text().as_bytes()));
}

#[tokio::test(start_paused = true)]
async fn test_healthy_entry_refreshes_after_max_age() {
    let now = Instant::now();
    let entry = CachedSchemaId::resolved(now, 7);
    let max_age = Duration::from_secs(60);

    assert!(!entry.retry());
    assert!(!entry.needs_refresh(now + Duration::from_secs(60), max_age));
    assert!(entry.needs_refresh(now + Duration::from_secs(61), max_age));
}

#[tokio::test(start_paused = true)]
async fn test_failing_entry_refreshes_after_retry_delay() {
    let now = Instant::now();
    let mut entry = CachedSchemaId::resolved(now, 7);
    entry.event_state = 1;
    entry.retry_delay = Duration::from_secs(2);

    let max_age = Duration::from_secs(60);
    assert!(entry.retry());
    assert!(!entry.needs_refresh(now + Duration::from_secs(1), max_age));
    assert!(entry.needs_refresh(now + Duration::from_secs(2), max_age));
}

#[tokio::test(start_paused = true)]
async fn test_served_id_honours_staleness_limit() {
    let now = Instant::now();
    let mut entry = CachedSchemaId::resolved(now, 7);
    entry.event_state = 3;

    let later = now + Duration::from_secs(120);
    assert_eq!(entry.served_id(later, None), 7, "No limit serves stale ids");
    assert_eq!(entry.served_id(later, Some(Duration::from_secs(300))), 7);
    assert_eq!(
        entry.served_id(later, Some(Duration::from_secs(60))),
        NO_SCHEMA_ID,
        "Ids older than the limit are withheld"
    );
}

#[tokio::test]
async fn test_store_evicts_oldest_entries_beyond_capacity() {
    let store = SchemaStore::new(2);
    store.put_schema(1, CachedSchemaText::new("a")).await;
    store.put_schema(2, CachedSchemaText::new("b")).await;
    store.put_schema(3, CachedSchemaText::new("c")).await;

    assert_eq!(store.schema_count().await, 2);
    assert!(store.schema(1).await.is_none(), "Oldest entry is evicted");
    assert_eq!(store.schema(3).await.expect("newest entry").text(), "c");
}

#[tokio::test]
async fn test_failure_streak_counts() {
    let store = SchemaStore::default();

    assert_eq!(store.record_id_failure(5).await, 0);
    assert_eq!(store.record_id_failure(5).await, 1);
    assert_eq!(store.clear_id_failures(5).await, 2);
    assert_eq!(store.clear_id_failures(5).await, 0);
}
