//! Avro model
//!
//! Validates and converts Avro datums framed by the catalog envelope. Payloads are
//! raw Avro binary (no object container), decoded with `from_avro_datum` and
//! encoded with `to_avro_datum`.

use apache_avro::types::Value;
use apache_avro::Schema as AvroSchema;
use std::sync::Arc;

use super::avro_json::{self, NamedTypes};
use super::compiled_cache::{CompiledSchema, CompiledSchemaCache, SchemaCompiler};
use super::extract::ExtractedFields;
use super::padding::PaddingBound;
use super::{resolve_envelope, resolve_schema_id, SerializationError, SerializationResult};
use crate::velostream::config::{ModelConfig, ModelView};
use crate::velostream::schema::{SchemaCatalog, SchemaId};

/// Everything needed to handle messages of one Avro schema
#[derive(Debug)]
pub struct AvroArtifact {
    schema: AvroSchema,
    names: NamedTypes,
    json_bound: PaddingBound,
    binary_per_char: usize,
}

impl AvroArtifact {
    pub fn new(schema: AvroSchema) -> Self {
        let names = avro_json::collect_named_types(&schema);
        let json_bound = avro_json::json_bound(&schema, &names);
        let binary_per_char = avro_json::binary_per_char(&schema, &names);
        Self {
            schema,
            names,
            json_bound,
            binary_per_char,
        }
    }

    pub fn schema(&self) -> &AvroSchema {
        &self.schema
    }

    /// Bound on JSON output relative to the binary payload
    pub fn json_bound(&self) -> PaddingBound {
        self.json_bound
    }

    /// Decode one datum; trailing bytes make the payload invalid
    pub fn decode(&self, payload: &[u8]) -> SerializationResult<Value> {
        let mut reader = payload;
        let value = apache_avro::from_avro_datum(&self.schema, &mut reader, None)
            .map_err(|e| SerializationError::avro_error("Failed to decode Avro datum", e))?;
        if !reader.is_empty() {
            return Err(SerializationError::decode(format!(
                "{} trailing bytes after Avro datum",
                reader.len()
            )));
        }
        // A string or bytes read cut short at end of input decodes to Null
        if !value.validate(&self.schema) {
            return Err(SerializationError::decode(
                "Avro datum does not match its schema (truncated payload)",
            ));
        }
        Ok(value)
    }

    pub fn to_json(&self, value: &Value) -> SerializationResult<String> {
        avro_json::to_json(value, &self.schema, &self.names)
    }

    /// Encode Avro JSON text as a binary datum
    pub fn encode_json(&self, json: &[u8]) -> SerializationResult<Vec<u8>> {
        let parsed: serde_json::Value = serde_json::from_slice(json)
            .map_err(|e| SerializationError::json_error("Invalid JSON input", e))?;
        let value = avro_json::from_json(&parsed, &self.schema, &self.names)?;
        apache_avro::to_avro_datum(&self.schema, value).map_err(|e| {
            log::debug!("to_avro_datum() failed: {:?}", e);
            SerializationError::Encode {
                message: format!("Failed to encode Avro datum: {}", e),
                source: Some(Box::new(e)),
            }
        })
    }
}

pub struct AvroCompiler;

impl SchemaCompiler for AvroCompiler {
    type Artifact = AvroArtifact;

    fn compile(&self, schema_id: SchemaId, schema: &str) -> SerializationResult<AvroArtifact> {
        let schema = AvroSchema::parse_str(schema).map_err(|e| SerializationError::SchemaCompile {
            schema_id,
            message: format!("Failed to parse Avro schema: {}", e),
            source: Some(Box::new(e)),
        })?;
        Ok(AvroArtifact::new(schema))
    }
}

/// Avro handling shared by every stream of one model configuration
pub struct AvroModel {
    config: ModelConfig,
    cache: CompiledSchemaCache<AvroCompiler>,
}

impl AvroModel {
    pub fn new(config: ModelConfig, catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            config,
            cache: CompiledSchemaCache::new(catalog, AvroCompiler),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        self.cache.catalog()
    }

    pub fn cache(&self) -> &CompiledSchemaCache<AvroCompiler> {
        &self.cache
    }

    async fn decode_framed(
        &self,
        data: &[u8],
    ) -> SerializationResult<(Arc<CompiledSchema<AvroArtifact>>, Value)> {
        let (schema_id, offset) =
            resolve_envelope(self.catalog().as_ref(), &self.config.schema, data).await?;
        let compiled = self.cache.get(schema_id).await?;
        let value = compiled.artifact().decode(&data[offset..])?;
        Ok((compiled, value))
    }

    pub async fn validate(&self, data: &[u8]) -> SerializationResult<()> {
        self.decode_framed(data).await.map(|_| ())
    }

    /// Framed binary to the requested view
    pub async fn read(
        &self,
        data: &[u8],
        view: ModelView,
        extracted: &mut ExtractedFields,
    ) -> SerializationResult<Vec<u8>> {
        let (compiled, value) = self.decode_framed(data).await?;
        if !extracted.is_empty() {
            extracted.capture(|segments| avro_json::extract_text(&value, segments));
        }
        match view {
            ModelView::Native => Ok(data.to_vec()),
            ModelView::Json => {
                let json = compiled.artifact().to_json(&value)?;
                // Items without payload bytes (arrays of nulls) escape the per-byte bound
                let limit = compiled
                    .artifact()
                    .json_bound()
                    .output_bound(data.len())
                    .max(data.len());
                if json.len() > limit {
                    return Err(SerializationError::MessageTooLarge {
                        size: json.len(),
                        limit,
                    });
                }
                Ok(json.into_bytes())
            }
        }
    }

    /// Input in the requested view to framed binary
    pub async fn write(&self, data: &[u8], view: ModelView) -> SerializationResult<Vec<u8>> {
        let schema_id = resolve_schema_id(self.catalog().as_ref(), &self.config.schema).await?;
        let compiled = self.cache.get(schema_id).await?;
        let payload = match view {
            ModelView::Json => compiled.artifact().encode_json(data)?,
            ModelView::Native => {
                compiled.artifact().decode(data)?;
                data.to_vec()
            }
        };

        let catalog = self.catalog();
        let mut out = Vec::with_capacity(catalog.encode_padding() + payload.len());
        catalog.encode_envelope(schema_id, &mut out);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub async fn read_padding(&self, data: &[u8], view: ModelView) -> usize {
        if view == ModelView::Native {
            return 0;
        }
        let schema_id = match self.catalog().decode_envelope(data) {
            Some((schema_id, _)) => schema_id,
            None => match resolve_schema_id(self.catalog().as_ref(), &self.config.schema).await {
                Ok(schema_id) => schema_id,
                Err(_) => return 0,
            },
        };
        match self.cache.get(schema_id).await {
            Ok(compiled) => compiled.artifact().json_bound().padding(data.len()),
            Err(e) => {
                log::debug!("No padding for schema {}: {}", schema_id, e);
                0
            }
        }
    }

    pub async fn write_padding(&self, data: &[u8], view: ModelView) -> usize {
        let envelope = self.catalog().encode_padding();
        if view == ModelView::Native {
            return envelope;
        }
        let per_char = match resolve_schema_id(self.catalog().as_ref(), &self.config.schema).await {
            Ok(schema_id) => match self.cache.get(schema_id).await {
                Ok(compiled) => compiled.artifact().binary_per_char,
                Err(_) => 0,
            },
            Err(_) => 0,
        };
        envelope + per_char.saturating_sub(1) * data.len()
    }
}
