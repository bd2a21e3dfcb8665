//! Unit tests for the cached schema registry client

use std::sync::Arc;
use std::time::Duration;

use crate::unit::common::{init_logging, Reply, ScriptedTransport, EVENT_AVRO_SCHEMA};
use velostream_codec::velostream::config::StaleEventPolicy;
use velostream_codec::{
    CatalogConfig, RecordingEventSink, SchemaCatalog, SchemaError, SchemaRegistryClient,
    NO_SCHEMA_ID,
};

const ORDERS_PATH: &str = "/subjects/orders/versions/3";

fn test_config() -> CatalogConfig {
    let mut config = CatalogConfig::new("registry0", "http://localhost:8081");
    config.max_age = Duration::from_secs(60);
    config.fetch_timeout = Duration::from_secs(5);
    config.retry_initial_delay = Duration::from_secs(1);
    config.retry_multiplier = 2;
    config
}

fn client_with(
    config: CatalogConfig,
) -> (SchemaRegistryClient, Arc<ScriptedTransport>, Arc<RecordingEventSink>) {
    init_logging();
    let transport = ScriptedTransport::new();
    let events = Arc::new(RecordingEventSink::new());
    let client = SchemaRegistryClient::with_transport(config, transport.clone())
        .with_event_sink(events.clone());
    (client, transport, events)
}

#[test]
fn test_from_config_requires_url() {
    let config = CatalogConfig::default();
    let result = SchemaRegistryClient::from_config(config);
    assert!(
        matches!(result, Err(SchemaError::Configuration { .. })),
        "A registry catalog without catalog.url must be rejected"
    );
}

#[test]
fn test_retry_delay_doubles_up_to_max_age() {
    let (client, _, _) = client_with(test_config());

    assert_eq!(client.next_retry_delay(Duration::ZERO), Duration::from_secs(1));
    assert_eq!(client.next_retry_delay(Duration::from_secs(1)), Duration::from_secs(2));
    assert_eq!(client.next_retry_delay(Duration::from_secs(16)), Duration::from_secs(32));
    assert_eq!(
        client.next_retry_delay(Duration::from_secs(32)),
        Duration::from_secs(60),
        "Back-off is capped at max_age"
    );
}

#[tokio::test]
async fn test_resolve_by_id_is_cached() {
    let (client, transport, _) = client_with(test_config());
    transport.respond_schema(7, EVENT_AVRO_SCHEMA);

    let first = client.resolve_by_id(7).await.expect("schema 7 should resolve");
    let second = client.resolve_by_id(7).await.expect("schema 7 should be cached");

    assert_eq!(first.text(), EVENT_AVRO_SCHEMA);
    assert_eq!(first.checksum(), second.checksum());
    assert_eq!(transport.calls("/schemas/ids/7"), 1, "Second lookup must hit the cache");
}

#[tokio::test]
async fn test_invalid_ids_never_reach_the_registry() {
    let (client, transport, _) = client_with(test_config());

    assert!(client.resolve_by_id(NO_SCHEMA_ID).await.is_none());
    assert!(client.resolve_by_id(-4).await.is_none());
    assert_eq!(transport.calls("/schemas/ids/0"), 0);
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_fetch() {
    let (client, transport, _) = client_with(test_config());
    transport.respond_schema(7, EVENT_AVRO_SCHEMA);
    transport.respond_subject("orders", "3", 7);
    transport.set_delay(Duration::from_millis(50));

    let schemas = futures::future::join_all((0..10).map(|_| client.resolve_by_id(7))).await;
    let ids = futures::future::join_all((0..10).map(|_| client.resolve_subject_version("orders", "3")))
        .await;

    assert!(schemas.iter().all(|s| s.as_ref().is_some_and(|s| s.text() == EVENT_AVRO_SCHEMA)));
    assert!(ids.iter().all(|id| *id == 7));
    assert_eq!(transport.calls("/schemas/ids/7"), 1, "Schema fetch must be de-duplicated");
    assert_eq!(transport.calls(ORDERS_PATH), 1, "Subject fetch must be de-duplicated");
}

#[tokio::test]
async fn test_unretrievable_schema_id_events_are_edge_triggered() {
    let (client, transport, events) = client_with(test_config());
    transport.fail("/schemas/ids/7", 503);

    assert!(client.resolve_by_id(7).await.is_none());
    assert!(client.resolve_by_id(7).await.is_none());
    assert_eq!(transport.calls("/schemas/ids/7"), 2, "Failures are not cached");
    assert_eq!(events.count("unretrievable-schema-id"), 1, "Only the first failure is reported");

    transport.respond_schema(7, EVENT_AVRO_SCHEMA);
    assert!(client.resolve_by_id(7).await.is_some());
    assert_eq!(events.count("recovered-schema-id"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_subject_version_ttl_and_stale_fallback() {
    let (client, transport, events) = client_with(test_config());
    transport.respond_subject("orders", "3", 7);

    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(transport.calls(ORDERS_PATH), 1, "Id is served from cache within max_age");

    // Registry goes down after the entry expires
    transport.fail(ORDERS_PATH, 503);
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(
        client.resolve_subject_version("orders", "3").await,
        7,
        "Last good id is served while the registry fails"
    );
    assert_eq!(transport.calls(ORDERS_PATH), 2);
    assert_eq!(events.count("unretrievable-schema-subject-version"), 1);
    assert_eq!(events.count("stale-schema-used"), 1);

    // Within the back-off window no request is made
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(transport.calls(ORDERS_PATH), 2);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(transport.calls(ORDERS_PATH), 3);
    assert_eq!(events.count("unretrievable-schema-subject-version"), 1);
    assert_eq!(events.count("stale-schema-used"), 1, "Stale use is reported once per outage");

    // Delay doubled to 2s; recovery picks up the new id
    transport.respond_subject("orders", "3", 8);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(transport.calls(ORDERS_PATH), 3);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 8);
    assert_eq!(transport.calls(ORDERS_PATH), 4);
    assert_eq!(events.count("recovered-schema-subject-version"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_event_rearms_after_recovery() {
    let (client, transport, events) = client_with(test_config());
    transport.respond_subject("orders", "3", 7);
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);

    // First outage: one stale event across two failed refreshes
    transport.fail(ORDERS_PATH, 503);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(transport.calls(ORDERS_PATH), 3);
    assert_eq!(events.count("stale-schema-used"), 1);

    // Recovery after the 2s back-off
    transport.respond_subject("orders", "3", 7);
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(transport.calls(ORDERS_PATH), 4);
    assert_eq!(events.count("recovered-schema-subject-version"), 1);
    assert_eq!(events.count("stale-schema-used"), 1);

    // Second outage starts a new streak and reports stale use again
    transport.fail(ORDERS_PATH, 503);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(transport.calls(ORDERS_PATH), 5);
    assert_eq!(events.count("unretrievable-schema-subject-version"), 2);
    assert_eq!(events.count("stale-schema-used"), 2, "Stale use is reported again after recovery");

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);
    assert_eq!(events.count("stale-schema-used"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_event_per_failed_fetch_policy() {
    let mut config = test_config();
    config.stale_event_policy = StaleEventPolicy::OncePerFailedFetch;
    let (client, transport, events) = client_with(config);
    transport.respond_subject("orders", "3", 7);
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);

    transport.fail(ORDERS_PATH, 500);
    tokio::time::advance(Duration::from_secs(61)).await;
    client.resolve_subject_version("orders", "3").await;
    tokio::time::advance(Duration::from_secs(1)).await;
    client.resolve_subject_version("orders", "3").await;

    assert_eq!(transport.calls(ORDERS_PATH), 3);
    assert_eq!(events.count("stale-schema-used"), 2);
    assert_eq!(events.count("unretrievable-schema-subject-version"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_id_withheld_after_max_staleness() {
    let mut config = test_config();
    config.max_staleness = Some(Duration::from_secs(90));
    let (client, transport, _) = client_with(config);
    transport.respond_subject("orders", "3", 7);
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);

    transport.fail(ORDERS_PATH, 503);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(client.resolve_subject_version("orders", "3").await, 7);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(
        client.resolve_subject_version("orders", "3").await,
        NO_SCHEMA_ID,
        "Ids older than max_staleness are no longer served"
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_subject_without_history_resolves_to_no_id() {
    let (client, transport, events) = client_with(test_config());

    assert_eq!(client.resolve_subject_version("missing", "latest").await, NO_SCHEMA_ID);
    assert_eq!(transport.calls("/subjects/missing/versions/latest"), 1);
    assert_eq!(events.count("unretrievable-schema-subject-version"), 1);
    assert_eq!(events.count("stale-schema-used"), 0, "Nothing stale to serve");
}

#[tokio::test(start_paused = true)]
async fn test_hanging_registry_times_out() {
    let mut config = test_config();
    config.fetch_timeout = Duration::from_millis(100);
    let (client, transport, events) = client_with(config);
    transport.reply("/schemas/ids/7", Reply::Hang);

    assert!(client.resolve_by_id(7).await.is_none(), "Timed out lookup yields no schema");
    assert_eq!(events.count("unretrievable-schema-id"), 1);
}

#[tokio::test]
async fn test_register_and_unregister() {
    let (client, transport, _) = client_with(test_config());
    transport.respond("/subjects/orders/versions", r#"{"id":42}"#);
    transport.respond("/subjects/orders", "[1,2,3]");

    let schema_id = client.register("orders", "avro", EVENT_AVRO_SCHEMA).await;
    assert_eq!(schema_id, 42);

    let posted = transport.posted();
    assert_eq!(posted.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&posted[0].1).expect("JSON request body");
    assert_eq!(body["schemaType"], "AVRO");
    assert_eq!(body["schema"], EVENT_AVRO_SCHEMA);

    assert_eq!(client.unregister("orders").await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_register_failure_yields_no_id() {
    let (client, transport, _) = client_with(test_config());
    transport.fail("/subjects/orders/versions", 409);

    assert_eq!(client.register("orders", "avro", EVENT_AVRO_SCHEMA).await, NO_SCHEMA_ID);
    assert!(client.unregister("unknown").await.is_empty());
}
