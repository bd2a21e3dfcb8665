//! Protobuf model
//!
//! Schema text is compiled at runtime into a descriptor pool. Framed messages
//! carry the catalog envelope, then the index path of their message type, then
//! the Protobuf binary payload.

use prost::Message;
use prost_reflect::DynamicMessage;
use protox::file::{ChainFileResolver, File, FileResolver, GoogleFileResolver};
use protox::Compiler;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::compiled_cache::{CompiledSchemaCache, SchemaCompiler};
use super::extract::ExtractedFields;
use super::framing::IndexPath;
use super::padding::PaddingBound;
use super::protobuf_json;
use super::protobuf_tree::{DescriptorNode, DescriptorTree};
use super::{resolve_envelope, resolve_schema_id, SerializationError, SerializationResult};
use crate::velostream::config::{ModelConfig, ModelView};
use crate::velostream::schema::{SchemaCatalog, SchemaId};

const SCHEMA_FILE_NAME: &str = "schema.proto";

/// Serves the schema text under a fixed file name
struct InlineFileResolver {
    source: String,
}

impl FileResolver for InlineFileResolver {
    fn resolve_path(&self, path: &Path) -> Option<String> {
        (path == Path::new(SCHEMA_FILE_NAME)).then(|| SCHEMA_FILE_NAME.to_string())
    }

    fn open_file(&self, name: &str) -> Result<File, protox::Error> {
        if name == SCHEMA_FILE_NAME {
            File::from_source(name, &self.source)
        } else {
            Err(protox::Error::file_not_found(name))
        }
    }
}

/// Everything needed to handle messages of one Protobuf schema
pub struct ProtobufArtifact {
    tree: DescriptorTree,
    json_bound: PaddingBound,
    binary_per_char: usize,
    builders: Mutex<HashMap<String, DynamicMessage>>,
}

impl ProtobufArtifact {
    pub fn new(tree: DescriptorTree) -> Self {
        let nodes = tree.nodes();
        let json_bound = nodes
            .iter()
            .map(|node| protobuf_json::json_bound(node.descriptor()))
            .fold(PaddingBound::ZERO, PaddingBound::max);
        let binary_per_char = nodes
            .iter()
            .map(|node| protobuf_json::binary_per_char(node.descriptor()))
            .max()
            .unwrap_or(2);
        Self {
            tree,
            json_bound,
            binary_per_char,
            builders: Mutex::new(HashMap::new()),
        }
    }

    pub fn tree(&self) -> &DescriptorTree {
        &self.tree
    }

    pub fn json_bound(&self) -> PaddingBound {
        self.json_bound
    }

    /// Decode `payload` as `node` into the reusable builder for that type, then run `f` on it
    pub fn decode_with<R, F>(&self, node: &DescriptorNode, payload: &[u8], f: F) -> SerializationResult<R>
    where
        F: FnOnce(&DynamicMessage) -> SerializationResult<R>,
    {
        let mut builders = self.builders.lock().unwrap_or_else(PoisonError::into_inner);
        let message = builders
            .entry(node.full_name().to_string())
            .or_insert_with(|| DynamicMessage::new(node.descriptor().clone()));
        message.clear();
        message
            .merge(payload)
            .map_err(|e| SerializationError::protobuf_error("Failed to decode Protobuf message", e))?;
        if protobuf_json::has_unknown_fields(message) {
            return Err(SerializationError::decode(format!(
                "message {} carries fields unknown to the schema",
                node.full_name()
            )));
        }
        f(message)
    }

    /// Encode JSON text as a binary message of type `node`
    pub fn encode_json(&self, node: &DescriptorNode, json: &[u8]) -> SerializationResult<Vec<u8>> {
        let mut deserializer = serde_json::Deserializer::from_slice(json);
        let message = DynamicMessage::deserialize(node.descriptor().clone(), &mut deserializer)
            .map_err(|e| SerializationError::json_error("Invalid JSON input", e))?;
        deserializer
            .end()
            .map_err(|e| SerializationError::json_error("Trailing JSON input", e))?;
        Ok(message.encode_to_vec())
    }
}

pub struct ProtobufCompiler;

impl SchemaCompiler for ProtobufCompiler {
    type Artifact = ProtobufArtifact;

    fn compile(&self, schema_id: SchemaId, schema: &str) -> SerializationResult<ProtobufArtifact> {
        let compile_error = |message: String| SerializationError::SchemaCompile {
            schema_id,
            message,
            source: None,
        };

        let mut resolver = ChainFileResolver::new();
        resolver.add(InlineFileResolver {
            source: schema.to_string(),
        });
        resolver.add(GoogleFileResolver::new());

        let mut compiler = Compiler::with_file_resolver(resolver);
        compiler
            .include_imports(true)
            .open_file(SCHEMA_FILE_NAME)
            .map_err(|e| compile_error(format!("Failed to parse Protobuf schema: {}", e)))?;

        let pool = compiler.descriptor_pool();
        let file = pool
            .get_file_by_name(SCHEMA_FILE_NAME)
            .ok_or_else(|| compile_error("Compiled pool lacks the schema file".to_string()))?;
        let tree = DescriptorTree::new(&file);
        if tree.is_empty() {
            return Err(compile_error("Schema defines no message types".to_string()));
        }
        Ok(ProtobufArtifact::new(tree))
    }
}

/// Protobuf handling shared by every stream of one model configuration
pub struct ProtobufModel {
    config: ModelConfig,
    cache: CompiledSchemaCache<ProtobufCompiler>,
}

impl ProtobufModel {
    pub fn new(config: ModelConfig, catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            config,
            cache: CompiledSchemaCache::new(catalog, ProtobufCompiler),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        self.cache.catalog()
    }

    pub fn cache(&self) -> &CompiledSchemaCache<ProtobufCompiler> {
        &self.cache
    }

    /// Message type written by this model, the configured record or the first top-level type
    fn record_node<'a>(&self, schema_id: SchemaId, tree: &'a DescriptorTree) -> SerializationResult<&'a DescriptorNode> {
        match &self.config.schema.record {
            Some(record) => tree.find_by_name(record),
            None => tree.find_by_indexes(IndexPath::canonical().indexes()),
        }
        .ok_or_else(|| SerializationError::MessageTypeNotFound {
            name: self.config.schema.record.clone().unwrap_or_default(),
            schema_id,
        })
    }

    async fn decode_framed<R, F>(&self, data: &[u8], f: F) -> SerializationResult<R>
    where
        F: FnOnce(&DynamicMessage) -> SerializationResult<R>,
    {
        let (schema_id, offset) =
            resolve_envelope(self.catalog().as_ref(), &self.config.schema, data).await?;
        let (path, consumed) = IndexPath::decode(&data[offset..])?;
        let compiled = self.cache.get(schema_id).await?;
        let artifact = compiled.artifact();
        let node = artifact.tree().find_by_indexes(path.indexes()).ok_or_else(|| {
            SerializationError::MessageTypeNotFound {
                name: format!("{:?}", path.indexes()),
                schema_id,
            }
        })?;
        artifact.decode_with(node, &data[offset + consumed..], f)
    }

    pub async fn validate(&self, data: &[u8]) -> SerializationResult<()> {
        self.decode_framed(data, |_| Ok(())).await
    }

    /// Framed binary to the requested view
    pub async fn read(
        &self,
        data: &[u8],
        view: ModelView,
        extracted: &mut ExtractedFields,
    ) -> SerializationResult<Vec<u8>> {
        self.decode_framed(data, |message| {
            if !extracted.is_empty() {
                extracted.capture(|segments| protobuf_json::extract_text(message, segments));
            }
            match view {
                ModelView::Native => Ok(data.to_vec()),
                ModelView::Json => protobuf_json::to_json(message).map(String::into_bytes),
            }
        })
        .await
    }

    /// Input in the requested view to framed binary
    pub async fn write(&self, data: &[u8], view: ModelView) -> SerializationResult<Vec<u8>> {
        let schema_id = resolve_schema_id(self.catalog().as_ref(), &self.config.schema).await?;
        let compiled = self.cache.get(schema_id).await?;
        let artifact = compiled.artifact();
        let node = self.record_node(schema_id, artifact.tree())?;

        let payload = match view {
            ModelView::Json => artifact.encode_json(node, data)?,
            ModelView::Native => {
                artifact.decode_with(node, data, |_| Ok(()))?;
                data.to_vec()
            }
        };

        let path = IndexPath::new(node.indexes().to_vec());
        let catalog = self.catalog();
        let mut out =
            Vec::with_capacity(catalog.encode_padding() + path.encoded_len() + payload.len());
        catalog.encode_envelope(schema_id, &mut out);
        path.encode(&mut out);
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
        let Ok(schema_id) = resolve_schema_id(self.catalog().as_ref(), &self.config.schema).await
        else {
            return envelope + 1;
        };
        let Ok(compiled) = self.cache.get(schema_id).await else {
            return envelope + 1;
        };
        let artifact = compiled.artifact();
        let path_length = self
            .record_node(schema_id, artifact.tree())
            .map(|node| IndexPath::new(node.indexes().to_vec()).encoded_len())
            .unwrap_or(1);
        let per_char = match view {
            ModelView::Native => 1,
            ModelView::Json => artifact.binary_per_char,
        };
        envelope + path_length + per_char.saturating_sub(1) * data.len()
    }
}
