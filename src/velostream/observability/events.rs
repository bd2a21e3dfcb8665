//! Catalog and codec events
//!
//! Registry state transitions and per-message validation failures are reported
//! as [`SchemaEvent`]s. Each event names the catalog it came from and, where
//! applicable, the subject/version or schema id involved.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::velostream::schema::SchemaId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaEvent {
    /// Schema text for an id could not be fetched (first failure of a streak)
    UnretrievableSchemaId { catalog: String, schema_id: SchemaId },
    /// Schema text for an id was fetched again after a failure streak
    RetrievableSchemaId { catalog: String, schema_id: SchemaId },
    /// Subject/version could not be resolved (first failure of a streak)
    UnretrievableSubjectVersion {
        catalog: String,
        subject: String,
        version: String,
    },
    /// A previously resolved id is served because the refresh failed
    StaleSchemaUsed {
        catalog: String,
        subject: String,
        version: String,
        schema_id: SchemaId,
    },
    /// Subject/version resolved again after a failure streak
    RetrievableSubjectVersion {
        catalog: String,
        subject: String,
        version: String,
    },
    /// A message was rejected by a codec
    ValidationFailed {
        catalog: String,
        schema_id: SchemaId,
        reason: String,
    },
}

impl SchemaEvent {
    /// Stable event name
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaEvent::UnretrievableSchemaId { .. } => "unretrievable-schema-id",
            SchemaEvent::RetrievableSchemaId { .. } => "recovered-schema-id",
            SchemaEvent::UnretrievableSubjectVersion { .. } => "unretrievable-schema-subject-version",
            SchemaEvent::StaleSchemaUsed { .. } => "stale-schema-used",
            SchemaEvent::RetrievableSubjectVersion { .. } => "recovered-schema-subject-version",
            SchemaEvent::ValidationFailed { .. } => "validation-failed",
        }
    }

    pub fn catalog(&self) -> &str {
        match self {
            SchemaEvent::UnretrievableSchemaId { catalog, .. }
            | SchemaEvent::RetrievableSchemaId { catalog, .. }
            | SchemaEvent::UnretrievableSubjectVersion { catalog, .. }
            | SchemaEvent::StaleSchemaUsed { catalog, .. }
            | SchemaEvent::RetrievableSubjectVersion { catalog, .. }
            | SchemaEvent::ValidationFailed { catalog, .. } => catalog,
        }
    }

    /// Whether the event reports a return to normal operation
    pub fn is_recovery(&self) -> bool {
        matches!(
            self,
            SchemaEvent::RetrievableSchemaId { .. } | SchemaEvent::RetrievableSubjectVersion { .. }
        )
    }
}

impl fmt::Display for SchemaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaEvent::UnretrievableSchemaId { catalog, schema_id } => write!(
                f,
                "[{}] Unable to fetch schema for schema id {}",
                catalog, schema_id
            ),
            SchemaEvent::RetrievableSchemaId { catalog, schema_id } => write!(
                f,
                "[{}] Successfully fetched schema for schema id {}",
                catalog, schema_id
            ),
            SchemaEvent::UnretrievableSubjectVersion {
                catalog,
                subject,
                version,
            } => write!(
                f,
                "[{}] Unable to fetch schema for subject {} with version {}",
                catalog, subject, version
            ),
            SchemaEvent::StaleSchemaUsed {
                catalog,
                subject,
                version,
                schema_id,
            } => write!(
                f,
                "[{}] Unable to fetch schema for subject {} with version {}, using stale schema id {}",
                catalog, subject, version, schema_id
            ),
            SchemaEvent::RetrievableSubjectVersion {
                catalog,
                subject,
                version,
            } => write!(
                f,
                "[{}] Successfully fetched schema for subject {} with version {}",
                catalog, subject, version
            ),
            SchemaEvent::ValidationFailed {
                catalog,
                schema_id,
                reason,
            } => write!(
                f,
                "[{}] Validation failed for schema id {}: {}",
                catalog, schema_id, reason
            ),
        }
    }
}

/// Destination for schema events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SchemaEvent);
}

/// Writes every event through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: SchemaEvent) {
        if event.is_recovery() {
            log::info!("{}", event);
        } else {
            log::warn!("{}", event);
        }
    }
}

/// Keeps events in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SchemaEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<SchemaEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events with the given [`SchemaEvent::kind`]
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: SchemaEvent) {
        log::debug!("Recording event {}", event.kind());
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
