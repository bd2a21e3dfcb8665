//! Unit tests for catalog and model configuration

use serial_test::serial;
use std::collections::HashMap;
use std::time::Duration;

use velostream_codec::velostream::config::{
    CatalogDefaults, ConfigError, ModelDefaults, StaleEventPolicy,
};
use velostream_codec::velostream::schema::client::transport::AuthConfig;
use velostream_codec::{CatalogConfig, ModelConfig, ModelFormat, ModelOperation, ModelView};

fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
#[serial]
fn test_catalog_defaults() {
    let config = CatalogConfig::from_properties(&props(&[("catalog.url", "http://registry:8081")]))
        .expect("minimal catalog configuration");

    assert_eq!(config.name, "catalog0");
    assert_eq!(config.url.as_deref(), Some("http://registry:8081"));
    assert_eq!(config.max_age, Duration::from_millis(CatalogDefaults::DEFAULT_MAX_AGE_MS));
    assert_eq!(
        config.fetch_timeout,
        Duration::from_millis(CatalogDefaults::DEFAULT_FETCH_TIMEOUT_MS)
    );
    assert_eq!(config.retry_multiplier, CatalogDefaults::DEFAULT_RETRY_MULTIPLIER);
    assert_eq!(config.max_staleness, None);
    assert_eq!(config.stale_event_policy, StaleEventPolicy::OncePerStreak);
    assert_eq!(config.auth, AuthConfig::None);
}

#[test]
#[serial]
fn test_catalog_properties_override_defaults() {
    let config = CatalogConfig::from_properties(&props(&[
        ("catalog.name", "registry-east"),
        ("catalog.url", "http://registry:8081"),
        ("catalog.max.age.ms", "60000"),
        ("catalog.fetch.timeout.ms", "2500"),
        ("catalog.retry.initial.delay.ms", "250"),
        ("catalog.retry.multiplier", "3"),
        ("catalog.max.staleness.ms", "600000"),
        ("catalog.stale.event.policy", "once-per-failed-fetch"),
        ("catalog.cache.capacity", "16"),
    ]))
    .expect("full catalog configuration");

    assert_eq!(config.name, "registry-east");
    assert_eq!(config.max_age, Duration::from_secs(60));
    assert_eq!(config.fetch_timeout, Duration::from_millis(2500));
    assert_eq!(config.retry_initial_delay, Duration::from_millis(250));
    assert_eq!(config.retry_multiplier, 3);
    assert_eq!(config.max_staleness, Some(Duration::from_secs(600)));
    assert_eq!(config.stale_event_policy, StaleEventPolicy::OncePerFailedFetch);
    assert_eq!(config.cache_capacity, 16);
}

#[test]
#[serial]
fn test_catalog_rejects_invalid_values() {
    let result = CatalogConfig::from_properties(&props(&[("catalog.max.age.ms", "soon")]));
    assert!(matches!(
        result,
        Err(ConfigError::InvalidProperty { ref key, .. }) if key == "catalog.max.age.ms"
    ));

    let result = CatalogConfig::from_properties(&props(&[("catalog.retry.multiplier", "0")]));
    assert!(result.is_err(), "Back-off must grow");

    let result = CatalogConfig::from_properties(&props(&[("catalog.fetch.timeout.ms", "0")]));
    assert!(result.is_err(), "Requests need a timeout");

    let result = CatalogConfig::from_properties(&props(&[("catalog.stale.event.policy", "always")]));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_catalog_auth() {
    let basic = CatalogConfig::from_properties(&props(&[
        ("catalog.auth.username", "gateway"),
        ("catalog.auth.password", "secret"),
    ]))
    .expect("basic credentials");
    assert_eq!(
        basic.auth,
        AuthConfig::Basic {
            username: "gateway".to_string(),
            password: "secret".to_string()
        }
    );

    let bearer = CatalogConfig::from_properties(&props(&[("catalog.auth.token", "t0k3n")]))
        .expect("bearer token");
    assert_eq!(
        bearer.auth,
        AuthConfig::Bearer {
            token: "t0k3n".to_string()
        }
    );

    let mixed = CatalogConfig::from_properties(&props(&[
        ("catalog.auth.username", "gateway"),
        ("catalog.auth.token", "t0k3n"),
    ]));
    assert!(mixed.is_err());

    let orphan = CatalogConfig::from_properties(&props(&[("catalog.auth.password", "secret")]));
    assert!(matches!(
        orphan,
        Err(ConfigError::MissingProperty { ref key }) if key == "catalog.auth.username"
    ));
}

#[test]
#[serial]
fn test_catalog_environment_overrides() {
    std::env::set_var("VELOSTREAM_CATALOG_MAX_AGE_MS", "1234");
    std::env::set_var("VELOSTREAM_CATALOG_FETCH_TIMEOUT_MS", "not-a-number");

    let config = CatalogConfig::default();
    assert_eq!(config.max_age, Duration::from_millis(1234));
    assert_eq!(
        config.fetch_timeout,
        Duration::from_millis(CatalogDefaults::DEFAULT_FETCH_TIMEOUT_MS),
        "Unparseable overrides fall back to the default"
    );

    let explicit = CatalogConfig::from_properties(&props(&[("catalog.max.age.ms", "5")]))
        .expect("explicit max age");
    assert_eq!(explicit.max_age, Duration::from_millis(5), "Properties win over environment");

    std::env::remove_var("VELOSTREAM_CATALOG_MAX_AGE_MS");
    std::env::remove_var("VELOSTREAM_CATALOG_FETCH_TIMEOUT_MS");
}

#[test]
fn test_model_from_properties() {
    let config = ModelConfig::from_properties(&props(&[
        ("model.format", "protobuf"),
        ("model.operation", "write"),
        ("model.view", "json"),
        ("model.catalog", "registry-east"),
        ("model.subject", "orders-value"),
        ("model.version", "3"),
        ("model.record", "DemoMessage.SimpleMessage"),
        ("model.max.message.bytes", "4096"),
        ("model.extract", "$.id, $.customer.name"),
    ]))
    .expect("full model configuration");

    assert_eq!(config.format, ModelFormat::Protobuf);
    assert_eq!(config.operation, ModelOperation::Write);
    assert_eq!(config.view, ModelView::Json);
    assert_eq!(config.catalog, "registry-east");
    assert_eq!(config.schema.subject.as_deref(), Some("orders-value"));
    assert_eq!(config.schema.version, "3");
    assert_eq!(config.schema.record.as_deref(), Some("DemoMessage.SimpleMessage"));
    assert_eq!(config.max_message_bytes, 4096);
    assert_eq!(config.extract, vec!["$.id".to_string(), "$.customer.name".to_string()]);
}

#[test]
fn test_model_defaults() {
    let config = ModelConfig::from_properties(&props(&[
        ("model.format", "avro"),
        ("model.schema.id", "9"),
    ]))
    .expect("minimal model configuration");

    assert_eq!(config.operation, ModelOperation::Validate);
    assert_eq!(config.view, ModelView::Native);
    assert_eq!(config.catalog, "catalog0");
    assert_eq!(config.schema.schema_id, Some(9));
    assert_eq!(config.schema.version, ModelDefaults::DEFAULT_VERSION);
    assert_eq!(config.max_message_bytes, ModelDefaults::DEFAULT_MAX_MESSAGE_BYTES);
    assert!(config.extract.is_empty());
}

#[test]
fn test_model_rejects_incomplete_configuration() {
    let missing_format = ModelConfig::from_properties(&props(&[("model.schema.id", "9")]));
    assert!(matches!(
        missing_format,
        Err(ConfigError::MissingProperty { ref key }) if key == "model.format"
    ));

    let unknown_format = ModelConfig::from_properties(&props(&[
        ("model.format", "thrift"),
        ("model.schema.id", "9"),
    ]));
    assert!(unknown_format.is_err());

    let no_schema = ModelConfig::from_properties(&props(&[("model.format", "avro")]));
    assert!(matches!(no_schema, Err(ConfigError::Invalid { .. })));

    let zero_id = ModelConfig::from_properties(&props(&[
        ("model.format", "avro"),
        ("model.schema.id", "0"),
    ]));
    assert!(zero_id.is_err(), "Schema id 0 names no schema");

    let bad_path = ModelConfig::from_properties(&props(&[
        ("model.format", "avro"),
        ("model.schema.id", "9"),
        ("model.extract", "id"),
    ]));
    assert!(matches!(
        bad_path,
        Err(ConfigError::InvalidProperty { ref key, .. }) if key == "model.extract"
    ));
}

#[test]
fn test_enum_values_are_case_insensitive() {
    assert_eq!("AVRO".parse::<ModelFormat>(), Ok(ModelFormat::Avro));
    assert_eq!("proto".parse::<ModelFormat>(), Ok(ModelFormat::Protobuf));
    assert_eq!("Read".parse::<ModelOperation>(), Ok(ModelOperation::Read));
    assert_eq!("JSON".parse::<ModelView>(), Ok(ModelView::Json));
    assert!("xml".parse::<ModelView>().is_err());
}
