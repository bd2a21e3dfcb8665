//! Schema-governed serialization
//!
//! A [`ModelCodec`] validates or converts the messages of one stream against
//! schemas obtained from a [`SchemaCatalog`]. Each codec owns the per-stream
//! state (fragment buffer, extracted fields) and shares the compiled schemas of
//! its format model with every other stream created through
//! [`ModelCodec::for_stream`].
//!
//! ## Operations
//!
//! - **Validate**: check a framed binary message against its schema
//! - **Read**: framed binary to the configured view (`native` passes the message
//!   through after validation, `json` prints it)
//! - **Write**: configured view to framed binary (`json` input is parsed and
//!   encoded, `native` input is validated and framed)

pub mod avro_codec;
pub mod avro_json;
pub mod compiled_cache;
pub mod error;
pub mod extract;
pub mod fragment;
pub mod framing;
pub mod padding;
pub mod protobuf_codec;
pub mod protobuf_json;
pub mod protobuf_tree;

pub use error::{SerializationError, SerializationResult};
pub use fragment::{Fragment, FragmentAccumulator, FragmentFlags};
pub use framing::{IndexPath, WireFramer};
pub use padding::PaddingBound;

use std::sync::Arc;

use crate::velostream::config::{
    ModelConfig, ModelFormat, ModelOperation, ModelView, SchemaReference,
};
use crate::velostream::observability::events::{EventSink, LogEventSink, SchemaEvent};
use crate::velostream::schema::{SchemaCatalog, SchemaId, NO_SCHEMA_ID};
use avro_codec::AvroModel;
use extract::ExtractedFields;
use protobuf_codec::ProtobufModel;

/// Result of one conversion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converted {
    /// Fragment buffered, the message is not complete yet
    Pending,
    Output(Vec<u8>),
    Rejected,
}

impl Converted {
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            Converted::Output(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_output(self) -> Option<Vec<u8>> {
        match self {
            Converted::Output(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Converted::Rejected)
    }
}

/// Schema id named by configuration: the explicit id, else the subject/version lookup
pub(crate) async fn resolve_schema_id(
    catalog: &dyn SchemaCatalog,
    reference: &SchemaReference,
) -> SerializationResult<SchemaId> {
    if let Some(schema_id) = reference.schema_id.filter(|id| *id > NO_SCHEMA_ID) {
        return Ok(schema_id);
    }
    let Some(subject) = reference.subject.as_deref() else {
        return Err(SerializationError::SchemaIdUnresolved {
            reason: "no schema id or subject configured".to_string(),
        });
    };
    let schema_id = catalog
        .resolve_subject_version(subject, &reference.version)
        .await;
    if schema_id > NO_SCHEMA_ID {
        Ok(schema_id)
    } else {
        Err(SerializationError::SchemaIdUnresolved {
            reason: format!(
                "subject {} version {} not available from catalog '{}'",
                subject,
                reference.version,
                catalog.name()
            ),
        })
    }
}

/// Schema id and payload offset of an incoming message: the id in its envelope,
/// else the configured schema with the whole message as payload
pub(crate) async fn resolve_envelope(
    catalog: &dyn SchemaCatalog,
    reference: &SchemaReference,
    data: &[u8],
) -> SerializationResult<(SchemaId, usize)> {
    if let Some((schema_id, offset)) = catalog.decode_envelope(data) {
        if schema_id > NO_SCHEMA_ID {
            return Ok((schema_id, offset));
        }
    }
    Ok((resolve_schema_id(catalog, reference).await?, 0))
}

enum FormatModel {
    Avro(Arc<AvroModel>),
    Protobuf(Arc<ProtobufModel>),
}

impl FormatModel {
    fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        match self {
            FormatModel::Avro(model) => model.catalog(),
            FormatModel::Protobuf(model) => model.catalog(),
        }
    }

    fn share(&self) -> Self {
        match self {
            FormatModel::Avro(model) => FormatModel::Avro(Arc::clone(model)),
            FormatModel::Protobuf(model) => FormatModel::Protobuf(Arc::clone(model)),
        }
    }
}

/// Per-stream validator and converter for one model configuration
pub struct ModelCodec {
    config: Arc<ModelConfig>,
    model: FormatModel,
    events: Arc<dyn EventSink>,
    fragments: FragmentAccumulator,
    extracted: ExtractedFields,
}

impl ModelCodec {
    /// Build a codec reporting rejections to the log
    pub fn new(config: ModelConfig, catalog: Arc<dyn SchemaCatalog>) -> SerializationResult<Self> {
        Self::with_event_sink(config, catalog, Arc::new(LogEventSink))
    }

    pub fn with_event_sink(
        config: ModelConfig,
        catalog: Arc<dyn SchemaCatalog>,
        events: Arc<dyn EventSink>,
    ) -> SerializationResult<Self> {
        config.validate()?;
        if config.catalog != catalog.name() {
            log::warn!(
                "{} model configured for catalog '{}' is bound to catalog '{}'",
                config.format,
                config.catalog,
                catalog.name()
            );
        }

        let extracted = ExtractedFields::new(&config.extract)?;
        let model = match config.format {
            ModelFormat::Avro => FormatModel::Avro(Arc::new(AvroModel::new(config.clone(), catalog))),
            ModelFormat::Protobuf => {
                FormatModel::Protobuf(Arc::new(ProtobufModel::new(config.clone(), catalog)))
            }
        };
        log::debug!(
            "Created {} {:?} codec with {:?} view",
            config.format,
            config.operation,
            config.view
        );

        Ok(Self {
            fragments: FragmentAccumulator::new(config.max_message_bytes),
            config: Arc::new(config),
            model,
            events,
            extracted,
        })
    }

    /// Codec for another stream sharing this codec's compiled schemas
    pub fn for_stream(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            model: self.model.share(),
            events: Arc::clone(&self.events),
            fragments: FragmentAccumulator::new(self.config.max_message_bytes),
            extracted: self.extracted.for_stream(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn format(&self) -> ModelFormat {
        self.config.format
    }

    pub fn operation(&self) -> ModelOperation {
        self.config.operation
    }

    pub fn view(&self) -> ModelView {
        self.config.view
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        self.model.catalog()
    }

    /// Check a message fragment; non-final fragments are accepted once buffered
    pub async fn validate(&mut self, data: &[u8], flags: FragmentFlags) -> bool {
        let message = match self.fragments.accept(data, flags) {
            Fragment::Pending => return true,
            Fragment::Complete(message) => message,
            Fragment::Rejected(e) => {
                self.reject(data, &e);
                return false;
            }
        };

        let result = match self.config.operation {
            ModelOperation::Write => self.write(&message).await.map(|_| ()),
            ModelOperation::Validate | ModelOperation::Read => match &self.model {
                FormatModel::Avro(model) => model.validate(&message).await,
                FormatModel::Protobuf(model) => model.validate(&message).await,
            },
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                self.reject(&message, &e);
                false
            }
        }
    }

    /// Convert a message fragment in the direction of the configured operation
    pub async fn convert(&mut self, data: &[u8], flags: FragmentFlags) -> Converted {
        self.extracted.clear();
        let message = match self.fragments.accept(data, flags) {
            Fragment::Pending => return Converted::Pending,
            Fragment::Complete(message) => message,
            Fragment::Rejected(e) => {
                self.reject(data, &e);
                return Converted::Rejected;
            }
        };

        let result = match self.config.operation {
            ModelOperation::Write => self.write(&message).await,
            ModelOperation::Validate | ModelOperation::Read => self.read(&message).await,
        };
        match result {
            Ok(output) => Converted::Output(output),
            Err(e) => {
                self.extracted.clear();
                self.reject(&message, &e);
                Converted::Rejected
            }
        }
    }

    async fn read(&mut self, message: &[u8]) -> SerializationResult<Vec<u8>> {
        let view = match self.config.operation {
            ModelOperation::Validate => ModelView::Native,
            _ => self.config.view,
        };
        match &self.model {
            FormatModel::Avro(model) => model.read(message, view, &mut self.extracted).await,
            FormatModel::Protobuf(model) => model.read(message, view, &mut self.extracted).await,
        }
    }

    async fn write(&self, message: &[u8]) -> SerializationResult<Vec<u8>> {
        match &self.model {
            FormatModel::Avro(model) => model.write(message, self.config.view).await,
            FormatModel::Protobuf(model) => model.write(message, self.config.view).await,
        }
    }

    /// Extra bytes a caller must reserve beyond `data.len()` for the output of [`Self::convert`]
    pub async fn padding(&self, data: &[u8]) -> usize {
        match (self.config.operation, &self.model) {
            (ModelOperation::Validate, _) => 0,
            (ModelOperation::Read, FormatModel::Avro(model)) => {
                model.read_padding(data, self.config.view).await
            }
            (ModelOperation::Read, FormatModel::Protobuf(model)) => {
                model.read_padding(data, self.config.view).await
            }
            (ModelOperation::Write, FormatModel::Avro(model)) => {
                model.write_padding(data, self.config.view).await
            }
            (ModelOperation::Write, FormatModel::Protobuf(model)) => {
                model.write_padding(data, self.config.view).await
            }
        }
    }

    /// Drop the compiled schema for `schema_id` if its text changed in the catalog
    pub async fn invalidate_if_changed(&self, schema_id: SchemaId) -> bool {
        match &self.model {
            FormatModel::Avro(model) => model.cache().invalidate_if_changed(schema_id).await,
            FormatModel::Protobuf(model) => model.cache().invalidate_if_changed(schema_id).await,
        }
    }

    /// Value captured at `path` from the last message read
    pub fn extracted(&self, path: &str) -> Option<&str> {
        self.extracted.get(path)
    }

    pub fn extracted_length(&self, path: &str) -> usize {
        self.extracted(path).map_or(0, str::len)
    }

    fn reject(&self, data: &[u8], error: &SerializationError) {
        let catalog = self.catalog();
        let schema_id = match self.config.operation {
            ModelOperation::Write => self.config.schema.schema_id.unwrap_or(NO_SCHEMA_ID),
            ModelOperation::Validate | ModelOperation::Read => catalog.extract_id(data),
        };
        log::debug!(
            "Rejected {} message on catalog '{}': {}",
            self.config.format,
            catalog.name(),
            error
        );
        self.events.emit(SchemaEvent::ValidationFailed {
            catalog: catalog.name().to_string(),
            schema_id,
            reason: error.to_string(),
        });
    }
}
