//! Inline catalog
//!
//! A catalog holding one schema configured in place. Messages handled through it
//! carry no envelope unless framing is switched on; every message uses the
//! configured schema id.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::velostream::schema::{CachedSchemaText, SchemaCatalog, SchemaId, NO_SCHEMA_ID};
use crate::velostream::serialization::framing::WireFramer;

pub struct InlineCatalog {
    name: String,
    schema_id: SchemaId,
    schema: RwLock<CachedSchemaText>,
    framed: bool,
}

impl InlineCatalog {
    pub fn new(name: &str, schema_id: SchemaId, schema: &str) -> Self {
        Self {
            name: name.to_string(),
            schema_id,
            schema: RwLock::new(CachedSchemaText::new(schema)),
            framed: false,
        }
    }

    /// Use the registry envelope on the wire
    pub fn framed(mut self) -> Self {
        self.framed = true;
        self
    }

    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// Replace the schema text served for the configured id
    pub async fn update_schema(&self, schema: &str) {
        *self.schema.write().await = CachedSchemaText::new(schema);
    }
}

#[async_trait]
impl SchemaCatalog for InlineCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_by_id(&self, schema_id: SchemaId) -> Option<CachedSchemaText> {
        if schema_id > NO_SCHEMA_ID && schema_id == self.schema_id {
            Some(self.schema.read().await.clone())
        } else {
            None
        }
    }

    async fn resolve_subject_version(&self, _subject: &str, _version: &str) -> SchemaId {
        self.schema_id
    }

    fn extract_id(&self, data: &[u8]) -> SchemaId {
        if self.framed {
            WireFramer::extract_id(data)
        } else {
            self.schema_id
        }
    }

    fn decode_envelope(&self, data: &[u8]) -> Option<(SchemaId, usize)> {
        if self.framed {
            WireFramer::decode(data)
        } else {
            Some((self.schema_id, 0))
        }
    }

    fn encode_envelope(&self, schema_id: SchemaId, out: &mut Vec<u8>) {
        if self.framed {
            WireFramer::encode_prefix(schema_id, out);
        }
    }

    fn encode_padding(&self) -> usize {
        if self.framed {
            WireFramer::PREFIX_LENGTH
        } else {
            0
        }
    }
}
