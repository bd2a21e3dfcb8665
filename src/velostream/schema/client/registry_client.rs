//! Schema Registry Client Implementation
//!
//! Resolves schema text by id and schema ids by subject/version against a
//! Confluent-compatible registry. Lookups are served from the [`SchemaStore`]
//! whenever possible; misses go through one de-duplicated fetch per key.
//!
//! Registry failures are absorbed here. A failed subject/version refresh keeps
//! serving the previously resolved id (stale fallback) and backs off
//! exponentially before the next attempt. Events are edge-triggered: the first
//! failure of a streak and the recovery that ends it are each reported once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::in_flight::InFlight;
use super::transport::{HttpRegistryTransport, RegistryTransport};
use crate::velostream::config::{CatalogConfig, StaleEventPolicy};
use crate::velostream::observability::events::{EventSink, LogEventSink, SchemaEvent};
use crate::velostream::schema::{
    CachedSchemaId, CachedSchemaText, SchemaCatalog, SchemaError, SchemaId, SchemaResult,
    SchemaStore, SubjectVersionKey, NO_SCHEMA_ID,
};

/// API response for schema retrieval
#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: String,
}

/// API response for subject version lookup
#[derive(Debug, Deserialize)]
struct SubjectVersionResponse {
    id: SchemaId,
}

/// API request for schema registration
#[derive(Debug, Serialize)]
struct RegisterSchemaRequest<'a> {
    #[serde(rename = "schemaType")]
    schema_type: String,
    schema: &'a str,
}

/// API response for schema registration
#[derive(Debug, Deserialize)]
struct RegisterSchemaResponse {
    id: SchemaId,
}

/// Cached, de-duplicating schema registry catalog
pub struct SchemaRegistryClient {
    config: CatalogConfig,
    transport: Arc<dyn RegistryTransport>,
    store: SchemaStore,
    schemas_in_flight: InFlight<SchemaId, Option<CachedSchemaText>>,
    schema_ids_in_flight: InFlight<SubjectVersionKey, SchemaId>,
    events: Arc<dyn EventSink>,
}

impl SchemaRegistryClient {
    /// Create a client talking HTTP to `config.url`
    pub fn from_config(config: CatalogConfig) -> SchemaResult<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SchemaError::Configuration {
                message: format!("catalog '{}' has no catalog.url", config.name),
            })?;
        let transport =
            HttpRegistryTransport::new(url, config.fetch_timeout).with_auth(config.auth.clone());
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over an arbitrary transport
    pub fn with_transport(config: CatalogConfig, transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            store: SchemaStore::new(config.cache_capacity),
            config,
            transport,
            schemas_in_flight: InFlight::new(),
            schema_ids_in_flight: InFlight::new(),
            events: Arc::new(LogEventSink),
        }
    }

    /// Route events to `events` instead of the log
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    /// Delay before the next attempt after a failure at `current` delay
    pub fn next_retry_delay(&self, current: Duration) -> Duration {
        if current.is_zero() {
            self.config.retry_initial_delay
        } else {
            current
                .saturating_mul(self.config.retry_multiplier)
                .min(self.config.max_age)
        }
    }

    async fn bounded<F>(&self, path: &str, request: F) -> SchemaResult<String>
    where
        F: Future<Output = SchemaResult<String>>,
    {
        match tokio::time::timeout(self.config.fetch_timeout, request).await {
            Ok(response) => response,
            Err(_) => Err(SchemaError::Timeout {
                path: path.to_string(),
                timeout_ms: self.config.fetch_timeout.as_millis() as u64,
            }),
        }
    }

    async fn fetch_schema(&self, schema_id: SchemaId) -> SchemaResult<String> {
        let path = format!("/schemas/ids/{}", schema_id);
        let body = self.bounded(&path, self.transport.get(&path)).await?;
        let response: SchemaResponse =
            serde_json::from_str(&body).map_err(|e| SchemaError::InvalidResponse {
                path: path.clone(),
                message: "Failed to parse schema response".to_string(),
                source: Some(e),
            })?;
        Ok(response.schema)
    }

    async fn fetch_schema_id(&self, key: &SubjectVersionKey) -> SchemaResult<SchemaId> {
        let path = format!("/subjects/{}/versions/{}", key.subject(), key.version());
        let body = self.bounded(&path, self.transport.get(&path)).await?;
        let response: SubjectVersionResponse =
            serde_json::from_str(&body).map_err(|e| SchemaError::InvalidResponse {
                path: path.clone(),
                message: "Failed to parse subject version response".to_string(),
                source: Some(e),
            })?;
        if response.id <= NO_SCHEMA_ID {
            return Err(SchemaError::InvalidResponse {
                path,
                message: format!("Invalid schema id {}", response.id),
                source: None,
            });
        }
        Ok(response.id)
    }

    async fn refresh_schema(&self, schema_id: SchemaId) -> Option<CachedSchemaText> {
        if let Some(schema) = self.store.schema(schema_id).await {
            return Some(schema);
        }

        match self.fetch_schema(schema_id).await {
            Ok(text) => {
                let schema = CachedSchemaText::new(text);
                self.store.put_schema(schema_id, schema.clone()).await;
                if self.store.clear_id_failures(schema_id).await > 0 {
                    self.events.emit(SchemaEvent::RetrievableSchemaId {
                        catalog: self.config.name.clone(),
                        schema_id,
                    });
                }
                Some(schema)
            }
            Err(e) => {
                log::debug!("Schema id {} lookup failed: {}", schema_id, e);
                if self.store.record_id_failure(schema_id).await == 0 {
                    self.events.emit(SchemaEvent::UnretrievableSchemaId {
                        catalog: self.config.name.clone(),
                        schema_id,
                    });
                }
                None
            }
        }
    }

    async fn refresh_schema_id(&self, key: &SubjectVersionKey) -> SchemaId {
        let previous = self.store.schema_id(key).await;
        if let Some(cached) = &previous {
            let now = Instant::now();
            if !cached.needs_refresh(now, self.config.max_age) {
                return cached.served_id(now, self.config.max_staleness);
            }
        }

        let result = self.fetch_schema_id(key).await;
        let now = Instant::now();

        match result {
            Ok(id) => {
                if previous.as_ref().is_some_and(CachedSchemaId::retry) {
                    self.events.emit(SchemaEvent::RetrievableSubjectVersion {
                        catalog: self.config.name.clone(),
                        subject: key.subject().to_string(),
                        version: key.version().to_string(),
                    });
                }
                self.store
                    .put_schema_id(key.clone(), CachedSchemaId::resolved(now, id))
                    .await;
                id
            }
            Err(e) => {
                log::debug!(
                    "Subject {} version {} lookup failed: {}",
                    key.subject(),
                    key.version(),
                    e
                );
                let mut entry = previous.unwrap_or(CachedSchemaId {
                    timestamp: now,
                    resolved_at: None,
                    id: NO_SCHEMA_ID,
                    retry_delay: Duration::ZERO,
                    event_state: 0,
                    stale_notified: false,
                });

                if entry.event_state == 0 {
                    self.events.emit(SchemaEvent::UnretrievableSubjectVersion {
                        catalog: self.config.name.clone(),
                        subject: key.subject().to_string(),
                        version: key.version().to_string(),
                    });
                }
                entry.timestamp = now;
                entry.event_state = entry.event_state.saturating_add(1);
                entry.retry_delay = self.next_retry_delay(entry.retry_delay);

                let served = entry.served_id(now, self.config.max_staleness);
                if served > NO_SCHEMA_ID {
                    let notify = match self.config.stale_event_policy {
                        StaleEventPolicy::OncePerStreak => !entry.stale_notified,
                        StaleEventPolicy::OncePerFailedFetch => true,
                    };
                    if notify {
                        self.events.emit(SchemaEvent::StaleSchemaUsed {
                            catalog: self.config.name.clone(),
                            subject: key.subject().to_string(),
                            version: key.version().to_string(),
                            schema_id: served,
                        });
                        entry.stale_notified = true;
                    }
                }

                self.store.put_schema_id(key.clone(), entry).await;
                served
            }
        }
    }
}

#[async_trait]
impl SchemaCatalog for SchemaRegistryClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn resolve_by_id(&self, schema_id: SchemaId) -> Option<CachedSchemaText> {
        if schema_id <= NO_SCHEMA_ID {
            return None;
        }
        if let Some(schema) = self.store.schema(schema_id).await {
            return Some(schema);
        }
        self.schemas_in_flight
            .run(schema_id, || self.refresh_schema(schema_id))
            .await
    }

    async fn resolve_subject_version(&self, subject: &str, version: &str) -> SchemaId {
        let key = SubjectVersionKey::new(subject, version);
        if let Some(cached) = self.store.schema_id(&key).await {
            let now = Instant::now();
            if !cached.needs_refresh(now, self.config.max_age) {
                return cached.served_id(now, self.config.max_staleness);
            }
        }
        self.schema_ids_in_flight
            .run(key.clone(), || self.refresh_schema_id(&key))
            .await
    }

    async fn register(&self, subject: &str, schema_type: &str, schema: &str) -> SchemaId {
        let path = format!("/subjects/{}/versions", subject);
        let request = RegisterSchemaRequest {
            schema_type: schema_type.to_uppercase(),
            schema,
        };
        let body = match serde_json::to_string(&request) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Failed to serialize register request for {}: {}", subject, e);
                return NO_SCHEMA_ID;
            }
        };

        let response = self
            .bounded(&path, self.transport.post(&path, body))
            .await
            .and_then(|body| {
                serde_json::from_str::<RegisterSchemaResponse>(&body).map_err(|e| {
                    SchemaError::InvalidResponse {
                        path: path.clone(),
                        message: "Failed to parse register response".to_string(),
                        source: Some(e),
                    }
                })
            });

        match response {
            Ok(registered) => {
                log::info!("Registered schema id {} for subject {}", registered.id, subject);
                registered.id
            }
            Err(e) => {
                log::warn!("Failed to register schema for subject {}: {}", subject, e);
                NO_SCHEMA_ID
            }
        }
    }

    async fn unregister(&self, subject: &str) -> Vec<i32> {
        let path = format!("/subjects/{}", subject);
        let response = self
            .bounded(&path, self.transport.delete(&path))
            .await
            .and_then(|body| {
                serde_json::from_str::<Vec<i32>>(&body).map_err(|e| SchemaError::InvalidResponse {
                    path: path.clone(),
                    message: "Failed to parse unregister response".to_string(),
                    source: Some(e),
                })
            });

        match response {
            Ok(versions) => versions,
            Err(e) => {
                log::warn!("Failed to unregister subject {}: {}", subject, e);
                Vec::new()
            }
        }
    }
}
