//! Codec Configuration
//!
//! Catalog and model settings as handed over by the gateway's configuration
//! loader. Both are built from flat dotted-key property maps, the same shape the
//! velostream datasources use, and are validated up front so a codec never starts
//! with an unusable schema reference.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::velostream::schema::client::transport::AuthConfig;
use crate::velostream::schema::SchemaId;

/// Catalog defaults, each overridable through the environment
pub struct CatalogDefaults;

impl CatalogDefaults {
    pub const DEFAULT_MAX_AGE_MS: u64 = 300_000;
    pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;
    pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_RETRY_MULTIPLIER: u32 = 2;
    pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

    pub fn max_age() -> Duration {
        Duration::from_millis(env_or("VELOSTREAM_CATALOG_MAX_AGE_MS", Self::DEFAULT_MAX_AGE_MS))
    }

    pub fn fetch_timeout() -> Duration {
        Duration::from_millis(env_or(
            "VELOSTREAM_CATALOG_FETCH_TIMEOUT_MS",
            Self::DEFAULT_FETCH_TIMEOUT_MS,
        ))
    }

    pub fn retry_initial_delay() -> Duration {
        Duration::from_millis(env_or(
            "VELOSTREAM_CATALOG_RETRY_INITIAL_DELAY_MS",
            Self::DEFAULT_RETRY_INITIAL_DELAY_MS,
        ))
    }
}

/// Model defaults
pub struct ModelDefaults;

impl ModelDefaults {
    pub const DEFAULT_VERSION: &'static str = "latest";
    pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors, raised before any message is processed
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required property '{key}'")]
    MissingProperty { key: String },

    #[error("Invalid value '{value}' for property '{key}': {reason}")]
    InvalidProperty {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

fn parse_property<T>(
    properties: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    properties
        .get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidProperty {
                    key: key.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

fn parse_millis(
    properties: &HashMap<String, String>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_property::<u64>(properties, key)?.map(Duration::from_millis))
}

/// How often the stale-schema event fires during one registry outage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleEventPolicy {
    /// Once per failure streak, re-armed by the next successful fetch
    #[default]
    OncePerStreak,
    /// Once for every failed fetch that falls back to the stale id
    OncePerFailedFetch,
}

impl FromStr for StaleEventPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "once-per-streak" => Ok(StaleEventPolicy::OncePerStreak),
            "once-per-failed-fetch" => Ok(StaleEventPolicy::OncePerFailedFetch),
            other => Err(format!(
                "expected 'once-per-streak' or 'once-per-failed-fetch', got '{}'",
                other
            )),
        }
    }
}

/// Schema registry catalog configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Catalog name reported in events
    pub name: String,
    /// Registry base URL; required for registry-backed catalogs
    pub url: Option<String>,
    /// How long a resolved subject/version id is served before refreshing
    pub max_age: Duration,
    /// Upper bound for a single registry request
    pub fetch_timeout: Duration,
    /// First back-off delay after a failed subject/version fetch
    pub retry_initial_delay: Duration,
    /// Back-off growth factor, capped at `max_age`
    pub retry_multiplier: u32,
    /// How long a stale id may be served after its last successful fetch
    pub max_staleness: Option<Duration>,
    pub stale_event_policy: StaleEventPolicy,
    /// Entries kept per cache before the oldest is evicted
    pub cache_capacity: usize,
    pub auth: AuthConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            name: "catalog0".to_string(),
            url: None,
            max_age: CatalogDefaults::max_age(),
            fetch_timeout: CatalogDefaults::fetch_timeout(),
            retry_initial_delay: CatalogDefaults::retry_initial_delay(),
            retry_multiplier: CatalogDefaults::DEFAULT_RETRY_MULTIPLIER,
            max_staleness: None,
            stale_event_policy: StaleEventPolicy::default(),
            cache_capacity: CatalogDefaults::DEFAULT_CACHE_CAPACITY,
            auth: AuthConfig::None,
        }
    }
}

impl CatalogConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    /// Build a catalog configuration from `catalog.*` properties
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = properties.get("catalog.name") {
            config.name = name.clone();
        }
        config.url = properties.get("catalog.url").cloned();
        if let Some(max_age) = parse_millis(properties, "catalog.max.age.ms")? {
            config.max_age = max_age;
        }
        if let Some(timeout) = parse_millis(properties, "catalog.fetch.timeout.ms")? {
            config.fetch_timeout = timeout;
        }
        if let Some(delay) = parse_millis(properties, "catalog.retry.initial.delay.ms")? {
            config.retry_initial_delay = delay;
        }
        if let Some(multiplier) = parse_property::<u32>(properties, "catalog.retry.multiplier")? {
            config.retry_multiplier = multiplier;
        }
        config.max_staleness = parse_millis(properties, "catalog.max.staleness.ms")?;
        if let Some(policy) = parse_property(properties, "catalog.stale.event.policy")? {
            config.stale_event_policy = policy;
        }
        if let Some(capacity) = parse_property::<usize>(properties, "catalog.cache.capacity")? {
            config.cache_capacity = capacity;
        }

        config.auth = match (
            properties.get("catalog.auth.username"),
            properties.get("catalog.auth.password"),
            properties.get("catalog.auth.token"),
        ) {
            (Some(username), password, None) => AuthConfig::Basic {
                username: username.clone(),
                password: password.cloned().unwrap_or_default(),
            },
            (None, None, Some(token)) => AuthConfig::Bearer {
                token: token.clone(),
            },
            (None, None, None) => AuthConfig::None,
            (None, Some(_), None) => {
                return Err(ConfigError::MissingProperty {
                    key: "catalog.auth.username".to_string(),
                })
            }
            _ => {
                return Err(ConfigError::Invalid {
                    message: "catalog.auth.token cannot be combined with basic credentials"
                        .to_string(),
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_multiplier == 0 {
            return Err(ConfigError::InvalidProperty {
                key: "catalog.retry.multiplier".to_string(),
                value: self.retry_multiplier.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidProperty {
                key: "catalog.fetch.timeout.ms".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Payload format handled by a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Avro,
    Protobuf,
}

impl FromStr for ModelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avro" => Ok(ModelFormat::Avro),
            "protobuf" | "proto" => Ok(ModelFormat::Protobuf),
            other => Err(format!("unknown model format '{}'", other)),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFormat::Avro => write!(f, "avro"),
            ModelFormat::Protobuf => write!(f, "protobuf"),
        }
    }
}

/// What a codec does with each message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOperation {
    /// Accept or reject framed binary messages
    Validate,
    /// Framed binary in, `view` out
    Read,
    /// `view` in, framed binary out
    Write,
}

impl FromStr for ModelOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "validate" => Ok(ModelOperation::Validate),
            "read" => Ok(ModelOperation::Read),
            "write" => Ok(ModelOperation::Write),
            other => Err(format!("unknown model operation '{}'", other)),
        }
    }
}

/// Representation on the non-wire side of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelView {
    #[default]
    Native,
    Json,
}

impl FromStr for ModelView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(ModelView::Native),
            "json" => Ok(ModelView::Json),
            other => Err(format!("unknown model view '{}'", other)),
        }
    }
}

/// Which schema a codec uses when the message does not name one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReference {
    pub schema_id: Option<SchemaId>,
    pub subject: Option<String>,
    pub version: String,
    /// Protobuf message name, e.g. `DemoMessage.SimpleMessage`
    pub record: Option<String>,
}

impl Default for SchemaReference {
    fn default() -> Self {
        Self {
            schema_id: None,
            subject: None,
            version: ModelDefaults::DEFAULT_VERSION.to_string(),
            record: None,
        }
    }
}

/// Model codec configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub format: ModelFormat,
    pub operation: ModelOperation,
    pub view: ModelView,
    pub catalog: String,
    pub schema: SchemaReference,
    /// Largest message re-assembled from fragments
    pub max_message_bytes: usize,
    /// Field paths (`$.field`) captured by read conversions
    pub extract: Vec<String>,
}

impl ModelConfig {
    pub fn new(format: ModelFormat, operation: ModelOperation) -> Self {
        Self {
            format,
            operation,
            view: ModelView::default(),
            catalog: "catalog0".to_string(),
            schema: SchemaReference::default(),
            max_message_bytes: ModelDefaults::DEFAULT_MAX_MESSAGE_BYTES,
            extract: Vec::new(),
        }
    }

    pub fn with_view(mut self, view: ModelView) -> Self {
        self.view = view;
        self
    }

    pub fn with_schema_id(mut self, schema_id: SchemaId) -> Self {
        self.schema.schema_id = Some(schema_id);
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.schema.subject = Some(subject.to_string());
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.schema.version = version.to_string();
        self
    }

    pub fn with_record(mut self, record: &str) -> Self {
        self.schema.record = Some(record.to_string());
        self
    }

    pub fn with_extract(mut self, path: &str) -> Self {
        self.extract.push(path.to_string());
        self
    }

    /// Build a model configuration from `model.*` properties
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let format = parse_property::<ModelFormat>(properties, "model.format")?.ok_or_else(|| {
            ConfigError::MissingProperty {
                key: "model.format".to_string(),
            }
        })?;
        let operation = parse_property::<ModelOperation>(properties, "model.operation")?
            .unwrap_or(ModelOperation::Validate);

        let mut config = Self::new(format, operation);
        if let Some(view) = parse_property(properties, "model.view")? {
            config.view = view;
        }
        if let Some(catalog) = properties.get("model.catalog") {
            config.catalog = catalog.clone();
        }
        config.schema.schema_id = parse_property(properties, "model.schema.id")?;
        config.schema.subject = properties.get("model.subject").cloned();
        if let Some(version) = properties.get("model.version") {
            config.schema.version = version.clone();
        }
        config.schema.record = properties.get("model.record").cloned();
        if let Some(max) = parse_property(properties, "model.max.message.bytes")? {
            config.max_message_bytes = max;
        }
        if let Some(paths) = properties.get("model.extract") {
            config.extract = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_id = self.schema.schema_id.is_some_and(|id| id > 0);
        let has_subject = self.schema.subject.as_deref().is_some_and(|s| !s.is_empty());
        if !has_id && !has_subject {
            return Err(ConfigError::Invalid {
                message: format!(
                    "{} model on catalog '{}' needs model.schema.id or model.subject",
                    self.format, self.catalog
                ),
            });
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::InvalidProperty {
                key: "model.max.message.bytes".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(path) = self.extract.iter().find(|p| !p.starts_with("$.")) {
            return Err(ConfigError::InvalidProperty {
                key: "model.extract".to_string(),
                value: path.clone(),
                reason: "paths must start with '$.'".to_string(),
            });
        }
        Ok(())
    }
}
